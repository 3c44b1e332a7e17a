// src/verifier.rs
//
// Pass 2 client: show the model a padded crop of one candidate and ask for
// a TRUE/FALSE decision. Anything short of a clear TRUE is a rejection.

use crate::error::ClientError;
use crate::llm_client::VisionModelClient;
use crate::usage::ModelReply;

use image::RgbImage;
use std::future::Future;
use tracing::debug;

pub const VERIFICATION_PROMPT: &str = r#"
This is a tight zoom of a potential swimming pool.
Analyze it carefully to decide if it is a REAL swimming pool or a false positive (like a blue roof tarp, blue bin, or sports court).

Pool Indicators:
- Visible coping (the stone or tile border around the edge).
- Visible steps, ladders, or underwater lights.
- Texture of water (ripples, depth, clarity).
- Decking or lounge area surrounding it.

False Positive Indicators:
- Flat, uniform texture (like a plastic tarp).
- No border or coping; seems to be part of the roof structure.
- EXCLUSIVE ROOFTOP RULE: If a blue rectangle is embedded in a roof with NO visible pedestrian access (no stairs, no deck, no clear path), it is a tarp.
- Located in a strange place (e.g., middle of a road, immediately adjacent to a road, or industrial roof with no access).

Return ONLY 'TRUE' if it is definitely a pool, or 'FALSE' if it is a false positive.
"#;

/// Confirms or rejects a single candidate crop.
pub trait Verifier: Sync {
    fn verify(
        &self,
        crop: &RgbImage,
    ) -> impl Future<Output = Result<ModelReply<bool>, ClientError>> + Send;
}

pub struct ModelVerifier<'a> {
    client: &'a VisionModelClient,
}

impl<'a> ModelVerifier<'a> {
    pub fn new(client: &'a VisionModelClient) -> Self {
        Self { client }
    }
}

impl Verifier for ModelVerifier<'_> {
    async fn verify(&self, crop: &RgbImage) -> Result<ModelReply<bool>, ClientError> {
        let reply = self.client.generate(VERIFICATION_PROMPT, crop).await?;
        let verdict = is_affirmative(&reply.value);
        debug!("✅ Verifier said {:?} -> {}", reply.value.trim(), verdict);
        Ok(ModelReply::new(verdict, reply.usage))
    }
}

/// True only when the answer says TRUE and nothing that contradicts it.
pub fn is_affirmative(answer: &str) -> bool {
    let upper = answer.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    words.contains(&"TRUE") && !words.iter().any(|w| matches!(*w, "FALSE" | "NOT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("TRUE"));
        assert!(is_affirmative("  true\n"));
        assert!(is_affirmative("'TRUE'"));
        assert!(is_affirmative("**TRUE**."));
    }

    #[test]
    fn test_everything_else_is_rejection() {
        assert!(!is_affirmative("FALSE"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("Not true, this is a tarp."));
        assert!(!is_affirmative("TRUE or FALSE? Hard to say."));
        assert!(!is_affirmative("UNTRUE"));
        assert!(!is_affirmative("It might be a pool."));
    }
}
