//! Converts HTML fragments into WordprocessingML and writes `.docx` packages.
//!
//! ```no_run
//! use html_to_openxml::{Document, HtmlConverter};
//!
//! let mut doc = Document::new();
//! HtmlConverter::new(&mut doc).parse_html("<h1>Hello</h1><p>world</p>");
//! doc.save("hello.docx")?;
//! # Ok::<(), html_to_openxml::Error>(())
//! ```

pub mod cascade;
pub mod config;
pub mod converter;
pub mod css;
pub mod document;
pub mod error;
pub mod fetch;
pub mod image;
pub mod model;
pub mod numbering;
pub mod package;
pub mod style;
pub mod table;
pub mod token;
pub mod xml;

pub use config::{AcronymPosition, CaptionPosition, ConverterOptions, DefaultStyles, QuoteChars};
pub use converter::HtmlConverter;
pub use document::Document;
pub use error::{Error, Result};
pub use fetch::{DefaultFetcher, Fetch, Resource};
pub use model::{Block, Inline, Paragraph, Run, RunContent, Table};
