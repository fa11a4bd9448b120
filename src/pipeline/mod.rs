//! Pipeline stages for any-format-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable; the
//! orchestrator in [`crate::convert`] only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ resolve ──▶ (converter) ──▶ normalize ──▶ persist
//! (path/URL/  (type      (registry)     (canonical     (frontmatter,
//!  buffer)     token)                    result)        postprocess, encode)
//! ```
//!
//! 1. [`input`]:     name the input and read its bytes
//! 2. [`resolve`]:   derive one type token from extension, declared type
//!    and category
//! 3. [`normalize`]: turn an untrusted converter result into a
//!    [`crate::output::CanonicalResult`]; never fails
//! 4. [`persist`]:   write the document, images and extra files
//!    - [`encode`]      decodes image payloads
//!    - [`postprocess`] rewrites image links and tidies the body
//!    - [`frontmatter`] extracts, merges and formats YAML frontmatter

pub mod encode;
pub mod frontmatter;
pub mod input;
pub mod normalize;
pub mod persist;
pub mod postprocess;
pub mod resolve;
