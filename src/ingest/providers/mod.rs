pub mod document;
pub mod fixture;
pub mod rss;
pub mod serpapi;
