//! Video source providers
//!
//! A [`VideoSource`] hands out clips for track slots. The built-in
//! [`FallbackCatalog`] picks from a fixed list and ignores the keyword; a
//! search-backed source can be plugged in without touching the mixer.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::error::Result;
use crate::model::VideoRef;

/// Supplies a clip for a keyword
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Find a clip for `keyword`
    ///
    /// `Ok(None)` means nothing suitable; the caller leaves the track as is.
    async fn search(&self, keyword: &str) -> Result<Option<VideoRef>>;
}

/// (video id, title) pairs served by the fallback catalogue
const FALLBACK_VIDEOS: [(&str, &str); 12] = [
    ("jfKfPfyJRdk", "lofi hip hop radio"),
    ("5qap5aO4i9A", "lo-fi beats"),
    ("DWcJFNfaw9c", "ambient music"),
    ("lTRiuFIWV54", "relaxing music"),
    ("hHW1oY26kxQ", "study music"),
    ("rUxyKA_-grg", "nature sounds"),
    ("lE6RYpe9IT0", "rain sounds"),
    ("q76bMs-NwRk", "coffee shop"),
    ("WPni755-Krg", "jazz music"),
    ("sjkrrmBnpGE", "chillhop"),
    ("kgx4WGK0oNU", "meditation"),
    ("lCOF9LN_Zxs", "synthwave"),
];

/// Thumbnail URL for a video id
pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/mqdefault.jpg", video_id)
}

/// Uniformly random pick from a fixed list
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    videos: Vec<VideoRef>,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackCatalog {
    pub fn new() -> Self {
        Self::with_videos(
            FALLBACK_VIDEOS
                .iter()
                .map(|(id, title)| VideoRef::new(*id, *title, thumbnail_url(id)))
                .collect(),
        )
    }

    /// Catalogue over an arbitrary list (an empty list never yields a clip)
    pub fn with_videos(videos: Vec<VideoRef>) -> Self {
        Self { videos }
    }

    pub fn videos(&self) -> &[VideoRef] {
        &self.videos
    }
}

#[async_trait]
impl VideoSource for FallbackCatalog {
    fn name(&self) -> &'static str {
        "fallback-catalog"
    }

    async fn search(&self, _keyword: &str) -> Result<Option<VideoRef>> {
        Ok(self.videos.choose(&mut rand::thread_rng()).cloned())
    }
}
