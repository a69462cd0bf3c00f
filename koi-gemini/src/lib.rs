//! # koi-gemini
//!
//! A small async client for the Google Gemini REST API covering exactly what
//! the Koi assistant needs: content generation (plain and streamed over SSE)
//! and text embeddings (single and batched).
//!
//! ```rust,no_run
//! use koi_gemini::{Content, GenerateContentRequest, Gemini, Model, Part, Role};
//!
//! # async fn run() -> Result<(), koi_gemini::Error> {
//! let gemini = Gemini::with_model("YOUR_API_KEY", Model::Gemini25Flash)?;
//! let request = GenerateContentRequest {
//!     contents: vec![Content::new(Role::User, vec![Part::text("Hello")])],
//!     ..Default::default()
//! };
//! let response = gemini.generate_content(&request).await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

mod client;
mod model;

#[cfg(test)]
mod response_parsing_tests;

pub use client::{Error, Gemini, GeminiBuilder, Model};
pub use model::*;
