use std::{fmt::Write, fs, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read config template")]
    Read(#[from] std::io::Error),
}

/// The two insertion slots a step template may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// `fileNames = cms.untracked.vstring(...)`
    InputFiles,
    /// `fileName = cms.untracked.string(...)` (or `cms.string`)
    OutputFile,
}

/// A single template line, classified once at parse time
#[derive(Debug, Clone)]
enum Line {
    Verbatim(String),
    Slot {
        kind: Slot,
        /// leading whitespace, reproduced on render
        indent: String,
        /// assignment key as written in the template
        key: String,
        /// wrapper call before the opening parenthesis, e.g. `cms.untracked.vstring`
        wrapper: String,
        /// everything after the closing parenthesis, e.g. a trailing comma
        suffix: String,
    },
}

/// A parsed step config template: a sequence of verbatim lines with up to two
/// typed insertion slots. Everything that is not a slot is reproduced
/// byte-for-byte on render.
#[derive(Debug, Clone)]
pub struct ConfigTemplate {
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl ConfigTemplate {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn parse(content: &str) -> Self {
        let mut raw: Vec<&str> = content.split('\n').collect();
        let trailing_newline = raw.last() == Some(&"");
        if trailing_newline {
            raw.pop();
        }

        Self {
            lines: raw.into_iter().map(classify).collect(),
            trailing_newline,
        }
    }

    /// Substitute `inputs` into the input-files slot and `output` into the
    /// output-file slot. A template without one of the slots renders
    /// unchanged for that slot.
    pub fn render(&self, inputs: &[String], output: &str) -> String {
        let mut rendered = String::new();

        for (number, line) in self.lines.iter().enumerate() {
            if number > 0 {
                rendered.push('\n');
            }

            match line {
                Line::Verbatim(text) => rendered.push_str(text),
                Line::Slot {
                    kind,
                    indent,
                    key,
                    wrapper,
                    suffix,
                } => {
                    let value = match kind {
                        Slot::InputFiles => quoted_list(inputs),
                        Slot::OutputFile => format!("'{output}'"),
                    };

                    // infallible, writing into a String
                    write!(rendered, "{indent}{key} = {wrapper}({value}){suffix}").unwrap();
                }
            }
        }

        if self.trailing_newline {
            rendered.push('\n');
        }

        rendered
    }

    pub fn has_slot(&self, slot: Slot) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, Line::Slot { kind, .. } if *kind == slot))
    }
}

/// classify a single line as a slot or verbatim content
fn classify(line: &str) -> Line {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    // `fileNames` has to be probed before `fileName`, its prefix
    for (key, kind) in [("fileNames", Slot::InputFiles), ("fileName", Slot::OutputFile)] {
        let Some(assignment) = trimmed.strip_prefix(key) else {
            continue;
        };
        let Some(value) = assignment.trim_start().strip_prefix('=') else {
            continue;
        };

        let (Some(open), Some(close)) = (value.find('('), value.rfind(')')) else {
            continue;
        };
        if close < open {
            continue;
        }

        let wrapper = value[..open].trim();
        if !wrapper.starts_with("cms.") {
            continue;
        }

        return Line::Slot {
            kind,
            indent: indent.to_owned(),
            key: key.to_owned(),
            wrapper: wrapper.to_owned(),
            suffix: value[close + 1..].to_owned(),
        };
    }

    Line::Verbatim(line.to_owned())
}

/// single quoted reference or a multi-element list literal
fn quoted_list(entries: &[String]) -> String {
    entries
        .iter()
        .map(|entry| format!("'{entry}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"import FWCore.ParameterSet.Config as cms

process = cms.Process("STEP1")
process.source = cms.Source("PoolSource",
    fileNames = cms.untracked.vstring('file:placeholder.root'),
)
process.out = cms.OutputModule("PoolOutputModule",
    fileName = cms.untracked.string('placeholder.root'),
)
"#;

    #[test]
    fn substitutes_both_slots() {
        let template = ConfigTemplate::parse(TEMPLATE);
        let inputs = vec!["file:a.root".to_owned(), "file:b.root".to_owned()];
        let rendered = template.render(&inputs, "step1_0.root");

        assert!(rendered
            .contains("    fileNames = cms.untracked.vstring('file:a.root', 'file:b.root'),"));
        assert!(rendered.contains("    fileName = cms.untracked.string('step1_0.root'),"));
        assert!(!rendered.contains("placeholder"));
    }

    #[test]
    fn single_input_renders_single_reference() {
        let template = ConfigTemplate::parse(TEMPLATE);
        let rendered = template.render(&["file:only.root".to_owned()], "out.root");

        assert!(rendered.contains("fileNames = cms.untracked.vstring('file:only.root'),"));
    }

    #[test]
    fn non_matching_lines_pass_through_byte_for_byte() {
        let template = ConfigTemplate::parse(TEMPLATE);
        let rendered = template.render(&["file:x.root".to_owned()], "out.root");

        for (original, generated) in TEMPLATE.split('\n').zip(rendered.split('\n')) {
            if !original.contains("fileNames") && !original.contains("fileName") {
                assert_eq!(original, generated);
            }
        }
        assert!(rendered.ends_with(")\n"));
    }

    #[test]
    fn template_without_slots_is_reproduced_exactly() {
        let content = "# plain text\nno assignments here\n\ttabbed line\n";
        let template = ConfigTemplate::parse(content);

        assert!(!template.has_slot(Slot::InputFiles));
        assert!(!template.has_slot(Slot::OutputFile));
        assert_eq!(template.render(&["file:x.root".to_owned()], "out.root"), content);
    }

    #[test]
    fn file_names_is_not_mistaken_for_an_output_slot() {
        let template = ConfigTemplate::parse("fileNames = cms.untracked.vstring('x')\n");

        assert!(template.has_slot(Slot::InputFiles));
        assert!(!template.has_slot(Slot::OutputFile));
    }

    #[test]
    fn missing_trailing_newline_is_preserved() {
        let content = "fileName = cms.string('a.root')";
        let rendered = ConfigTemplate::parse(content).render(&[], "b.root");

        assert_eq!(rendered, "fileName = cms.string('b.root')");
    }
}
