pub mod browser;
pub mod capture;

pub use browser::ReplayBrowser;
pub use capture::Capture;
