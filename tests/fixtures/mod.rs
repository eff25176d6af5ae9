//! Listing photo references used across the pipeline tests
#![allow(dead_code)]

/// A listing photo and the category the fake classifier reports for it.
#[derive(Debug, Clone)]
pub struct ListingPhotoFixture {
    pub uri: &'static str,
    pub description: &'static str,
}

pub const LISTING_PHOTOS: &[ListingPhotoFixture] = &[
    ListingPhotoFixture {
        uri: "https://cdn.example.com/listings/1001/front.jpg",
        description: "Oak dining chair, front view",
    },
    ListingPhotoFixture {
        uri: "https://cdn.example.com/listings/1001/back.jpg",
        description: "Oak dining chair, back view",
    },
    ListingPhotoFixture {
        uri: "https://cdn.example.com/listings/1002/main.webp",
        description: "Road bike, side profile",
    },
    ListingPhotoFixture {
        uri: "https://cdn.example.com/listings/1003/main.png",
        description: "Mechanical keyboard, top down",
    },
    ListingPhotoFixture {
        uri: "https://cdn.example.com/listings/1004/label.jpg",
        description: "Denim jacket, size label close-up",
    },
];

/// The first `n` fixture URIs.
pub fn uris(n: usize) -> Vec<String> {
    LISTING_PHOTOS
        .iter()
        .take(n)
        .map(|p| p.uri.to_string())
        .collect()
}
