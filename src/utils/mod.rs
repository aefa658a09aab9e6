pub mod constants;
pub mod url_utils;

pub use constants::CHROME_USER_AGENT;
pub use url_utils::is_valid_url;
