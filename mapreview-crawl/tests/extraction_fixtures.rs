mod common;

use mapreview_crawl::context::{ContextId, Snapshot};
use mapreview_crawl::extractor::{ExtractionSchema, TolerantExtractor};

fn extractor(site: &str) -> TolerantExtractor {
    let spec = mapreview_config::builtin_site(site).unwrap();
    TolerantExtractor::new(ExtractionSchema::compile(&spec.extraction).unwrap())
}

#[test]
fn three_reviews_and_two_noise_nodes_yield_three_records() {
    common::init_test_tracing();
    let snapshot = Snapshot::new(ContextId::Detail, common::fixture("naver_entry_reviews.html"));
    let out = extractor("naver").extract(&snapshot, "성화해장국 인하점");

    assert_eq!(out.records.len(), 3);
    assert_eq!(out.noise_dropped, 2);
    assert!(out.records.iter().all(|r| !r.content.is_empty()));
    assert!(out.records.iter().all(|r| r.source_entity == "성화해장국 인하점"));

    let first = &out.records[0];
    assert_eq!(first.author.as_deref(), Some("맛집탐험가"));
    assert_eq!(first.content, "해장국 국물이 정말 진하고 깔끔해요");
    assert_eq!(first.date_text.as_deref(), Some("2024.5.12"));
    assert_eq!(first.tag.as_deref(), Some("재방문"));

    let second = &out.records[1];
    assert_eq!(second.author.as_deref(), Some("빵순이"));
    assert_eq!(second.content, "뼈다귀가 크고 고기가 부드러워요");
    assert_eq!(second.date_text.as_deref(), Some("2023년 11월 3일"));
    assert_eq!(second.tag, None);

    let third = &out.records[2];
    assert_eq!(third.author.as_deref(), Some("동네주민"));
    assert_eq!(third.content, "직원분들이 친절하고 주차가 편해요");
    assert_eq!(third.date_text, None);
}

#[test]
fn extraction_is_idempotent() {
    let snapshot = Snapshot::new(ContextId::Detail, common::fixture("naver_entry_reviews.html"));
    let extractor = extractor("naver");

    let first = extractor.extract(&snapshot, "place");
    let second = extractor.extract(&snapshot, "place");
    assert_eq!(first, second);

    let to_csv = |records: &[mapreview_crawl::ExtractionRecord]| {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer.serialize(record).unwrap();
        }
        writer.into_inner().unwrap()
    };
    assert_eq!(to_csv(&first.records), to_csv(&second.records));
}

#[test]
fn kakao_markup_strips_reviewer_label() {
    let snapshot = Snapshot::new(ContextId::Detail, common::fixture("kakao_place_detail.html"));
    let out = extractor("kakao").extract(&snapshot, "성화해장국 인하점");

    assert_eq!(out.records.len(), 2);
    assert_eq!(out.contentless_dropped, 1);
    assert_eq!(out.records[0].author.as_deref(), Some("국밥러버"));
    assert_eq!(out.records[0].content, "순대국이 깔끔하고 양이 많아요");
    assert_eq!(out.records[0].date_text.as_deref(), Some("2024.04.02."));
    assert_eq!(out.records[1].author.as_deref(), Some("야식왕"));
}

#[test]
fn nested_markup_keeps_short_fields_contiguous() {
    let snapshot = Snapshot::new(ContextId::Detail, common::fixture("naver_nested_markup.html"));
    let out = extractor("naver").extract(&snapshot, "인하반점");

    assert_eq!(out.records.len(), 1);
    let record = &out.records[0];
    assert_eq!(record.author.as_deref(), Some("빵순이"));
    assert_eq!(record.content, "짬뽕 국물이 정말 시원해요");
    assert_eq!(record.date_text.as_deref(), Some("2024.5.12"));
    assert_eq!(record.tag.as_deref(), Some("재방문"));
}
