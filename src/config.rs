use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::render::TerminationPolicy;

/// Record volumes the cost projector extrapolates to.
pub const DEFAULT_PROJECTION_VOLUMES: [u64; 4] = [100, 1_000, 100_000, 1_000_000];

/// Where the run's artifacts land. Parent directories are created on demand.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

/// Natural-language field schema handed to the extraction service:
/// per-field instructions plus one explicit example of the output shape.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub instructions: &'static str,
    pub example: &'static str,
}

impl FieldSchema {
    /// The full instruction text submitted alongside the document.
    pub fn instruction_block(&self) -> String {
        format!(
            "{}\n\nExample of one object in the array:\n{}",
            self.instructions.trim(),
            self.example.trim()
        )
    }
}

/// Everything one run needs, passed explicitly into each component instead of
/// living in module-level constants.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_url: String,
    pub output_paths: OutputPaths,
    pub credential: String,
    pub field_schema: FieldSchema,
    pub hypothetical_volumes: Vec<u64>,
    pub policy: TerminationPolicy,
    pub headless: bool,
}

/// Read the extraction-service credential from the environment. `.env` is
/// loaded by main before this runs.
pub fn credential_from_env() -> Result<String> {
    std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")
}

impl RunConfig {
    /// ConsumerAffairs review pages paginate behind a "Load more" button, so
    /// the control-driven policy applies: keep clicking until it disappears.
    pub fn consumer_reviews(credential: String) -> Self {
        Self {
            target_url: "https://www.consumeraffairs.com/automotive/autonation.htm".to_string(),
            output_paths: OutputPaths {
                html: PathBuf::from("outputs/ca_autonation_rendered.html"),
                json: PathBuf::from("outputs/ca_autonation_reviews.json"),
            },
            credential,
            field_schema: REVIEW_SCHEMA,
            hypothetical_volumes: DEFAULT_PROJECTION_VOLUMES.to_vec(),
            policy: TerminationPolicy::ControlDriven {
                trigger_text: "Load more".to_string(),
                settle: Duration::from_millis(1500),
                max_rounds: 200,
            },
            headless: true,
        }
    }

    /// AutoNation listing pages lazy-load tiles on scroll with no completion
    /// signal, so this profile can only scroll and hope the delay window
    /// covers hydration.
    pub fn car_listings(credential: String) -> Self {
        Self {
            target_url: "https://www.autonation.com/cars-for-sale?mk=chrysler".to_string(),
            output_paths: OutputPaths {
                html: PathBuf::from("outputs/autonation_rendered.html"),
                json: PathBuf::from("outputs/autonation_results.json"),
            },
            credential,
            field_schema: LISTING_SCHEMA,
            hypothetical_volumes: DEFAULT_PROJECTION_VOLUMES.to_vec(),
            policy: TerminationPolicy::ScrollDriven {
                cycles: 2,
                delay: Duration::from_secs(10),
            },
            headless: true,
        }
    }
}

const REVIEW_SCHEMA: FieldSchema = FieldSchema {
    instructions: r#"
The provided HTML source contains multiple customer reviews about AutoNation from ConsumerAffairs.

Your goal is to identify each individual review and extract the following fields precisely:
- reviewer_name: The name of the person who wrote the review.
- reviewer_location: The city and state (or country) of the reviewer, if available.
- review_date: The date the review was posted (extract only the date part, e.g., "YYYY-MM-DD" or "Month Day, Year").
- star_rating: The numerical star rating given by the reviewer (integer from 1 to 5).
- tags: A list of strings representing the short descriptive tags associated with the review (often shown as grey chips/pills). If none, use an empty list [].
- review_text: The full text content of the customer's review paragraph.
- likes: A list of strings containing up to 3 very brief positive points or phrases mentioned by the reviewer. Infer these from the review_text. If the review is mostly negative or neutral, or no specific positive points are mentioned, use an empty list [].
- dislikes: A list of strings containing up to 3 very brief negative points or phrases mentioned by the reviewer. Infer these from the review_text. If the review is mostly positive or neutral, or no specific negative points are mentioned, use an empty list [].

Guidelines for deriving 'likes' and 'dislikes':
- Consider the 'star_rating':
    - 4 or 5 stars: Focus primarily on extracting 'likes'. 'Dislikes' should likely be empty unless explicitly negative points are made.
    - 1 or 2 stars: Focus primarily on extracting 'dislikes'. 'Likes' should likely be empty unless explicitly positive points are made.
    - 3 stars: Both 'likes' and 'dislikes' might be present; extract relevant brief phrases for both if applicable.
- Keep the phrases very short and directly related to the review content.

Output Format:
Return ONLY a valid JSON array where each element is an object representing a single review, containing exactly the keys specified above.
Do NOT include any introductory text, markdown formatting (like ```json ... ```), or any keys not listed in the requirements.
"#,
    example: r#"
{
  "reviewer_name": "Jane D.",
  "reviewer_location": "Anytown, CA",
  "review_date": "2023-10-26",
  "star_rating": 5,
  "tags": ["Customer Service", "Easy Process"],
  "review_text": "The entire process was smooth and the staff were very helpful...",
  "likes": ["Smooth process", "Helpful staff"],
  "dislikes": []
}
"#,
};

const LISTING_SCHEMA: FieldSchema = FieldSchema {
    instructions: r#"
The provided HTML is from a car-listing site. Each car listing is inside a <ansrp-srp-tile-v3> tag.

For every car extract:
- car_name: The full text of the <h3> tag inside .tile-info, including any nested <span>.
- car_status: From the <span class="tile-status"> element (e.g., "In Stock").
- car_price: From <div class="price-Value">. If missing, return "N/A".
- car_mileage: From the <span class="vehicle-mileage"> element. Return the EXACT text shown on the page, including all digits, commas, and the word "miles". Do not abbreviate or round.

Return ONLY a JSON array of car objects. No markdown, no commentary.
"#,
    example: r#"
{
  "car_name": "2023 Acura Integra CVT w/A-Spec Technology Package",
  "car_status": "In Stock",
  "car_price": "$27,584",
  "car_mileage": "9 miles"
}
"#,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_schema_names_every_field() {
        let block = REVIEW_SCHEMA.instruction_block();
        for field in [
            "reviewer_name",
            "reviewer_location",
            "review_date",
            "star_rating",
            "tags",
            "review_text",
            "likes",
            "dislikes",
        ] {
            assert!(block.contains(field), "missing field: {field}");
        }
    }

    #[test]
    fn listing_schema_demands_verbatim_mileage() {
        let block = LISTING_SCHEMA.instruction_block();
        assert!(block.contains("car_mileage"));
        assert!(block.contains("EXACT text"));
    }

    #[test]
    fn profiles_carry_projection_volumes() {
        let config = RunConfig::consumer_reviews("test-key".to_string());
        assert_eq!(config.hypothetical_volumes, vec![100, 1_000, 100_000, 1_000_000]);
    }
}
