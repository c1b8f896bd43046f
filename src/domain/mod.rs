pub mod candidate;
pub mod grant;
