//! `forgeline classify`: show how a message would be routed.

use forgeline_engine::classify_with;
use forgeline_engine::IntentContext;

pub fn run(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let classification = classify_with(text, &IntentContext::default());
    let report = serde_json::json!({
        "mode": classification.mode,
        "effective_prompt": classification.effective_prompt,
        "image_request": classification.image_request,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
