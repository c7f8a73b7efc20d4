use crate::search::watch_url;
use crate::types::{ResultKind, ResultRecord};

const FEATURED: &[(&str, &str)] = &[
    ("Q5F-KFqW9f8", "Learn About Sharks!"),
    ("k-73nFI0yWc", "Space Facts for Kids 🚀"),
    ("w0ZtV2FTO44", "Dinosaurs Roar! 🦕"),
];

/// Hand-picked videos shown before any video search.
pub fn featured_videos() -> Vec<ResultRecord> {
    FEATURED
        .iter()
        .map(|(id, title)| ResultRecord {
            key: watch_url(id),
            title: title.to_string(),
            summary: String::new(),
            image_url: Some(format!("https://img.youtube.com/vi/{}/hqdefault.jpg", id)),
            kind: ResultKind::Video,
        })
        .collect()
}
