pub mod behavioral;
pub mod capabilities;
pub mod driver;
pub mod page;
