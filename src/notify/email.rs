//! Recommendation email formatting.

use std::fmt::Write as _;

use crate::scheduler::DiningJob;
use crate::storage::{RestaurantDetail, UNKNOWN};

/// A rendered recommendation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationEmail {
    pub subject: String,
    pub body: String,
}

impl RecommendationEmail {
    /// Renders the recommendations for `job`, listing `restaurants` in order.
    pub fn compose(job: &DiningJob, restaurants: &[RestaurantDetail]) -> Self {
        let subject = format!("Your {} Restaurant Recommendations", job.cuisine);

        let mut body = format!(
            "Hello!\n\nHere are my {} restaurant suggestions for {} people, for {} in {}:\n\n",
            job.cuisine,
            display_or_unknown(&job.party_size),
            display_or_unknown(&job.dining_time),
            display_or_unknown(&job.location),
        );

        for (position, restaurant) in restaurants.iter().enumerate() {
            write_entry(&mut body, position + 1, restaurant);
        }

        body.push_str("Enjoy your meal!");

        Self { subject, body }
    }
}

fn write_entry(body: &mut String, position: usize, restaurant: &RestaurantDetail) {
    let rating = restaurant
        .rating
        .map(|r| r.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let reviews = restaurant
        .review_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    // Writing into a String cannot fail.
    let _ = writeln!(body, "{}. {}", position, restaurant.name);
    let _ = writeln!(body, "   Address: {}", restaurant.address);
    let _ = writeln!(body, "   Rating: {}/5 ({} reviews)", rating, reviews);
    let _ = writeln!(body, "   Zip Code: {}", restaurant.zip_code);
    if let Some(coordinates) = restaurant.coordinates {
        let _ = writeln!(
            body,
            "   Coordinates: {}, {}",
            coordinates.latitude, coordinates.longitude
        );
    }
    body.push('\n');
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() {
        UNKNOWN
    } else {
        value
    }
}
