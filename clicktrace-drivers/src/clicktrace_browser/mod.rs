pub mod browser;
pub mod cdp;
pub mod frame;
pub mod identity;
pub mod launcher;
pub mod page;
