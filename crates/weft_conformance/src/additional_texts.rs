//! Copies every `.txt` additional file into a generated source file.

use weft_diagnostics::Diagnostic;
use weft_engine::{AdditionalText, PipelineBuilder};

use crate::auto_notify::GENERATOR_INFO;

/// A text file reduced to its stem and content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextSource {
    /// File name without directory or extension.
    pub name: String,
    /// File content.
    pub content: String,
}

/// Whether the generator picks up `text`.
pub fn is_text_file(text: &AdditionalText) -> bool {
    text.path.ends_with(".txt")
}

/// Registers the additional-text generator on `builder`.
pub fn register(builder: &PipelineBuilder) {
    let sources = builder
        .texts()
        .filter(is_text_file)
        .map(|text| TextSource {
            name: text.file_stem().to_string(),
            content: text.content.clone(),
        });
    builder.register_output(&sources, |ctx, source| {
        ctx.report(Diagnostic::info(
            GENERATOR_INFO,
            "Generator",
            format!("Processing file: {}", source.name),
        ));
        ctx.add_artifact(format!("{}.g.cs", source.name), source.content.as_str())?;
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_txt_files_are_selected() {
        assert!(is_text_file(&AdditionalText::new("notes/TextClass.txt", "")));
        assert!(!is_text_file(&AdditionalText::new("notes/readme.md", "")));
        assert!(!is_text_file(&AdditionalText::new("notes/archive.txt.bak", "")));
    }
}
