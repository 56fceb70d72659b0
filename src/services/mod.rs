mod content_fetcher;
mod html;

pub use content_fetcher::{ContentFetcher, ImageFetcher};
pub use html::extract_image_urls_from_html;
