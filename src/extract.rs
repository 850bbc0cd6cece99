use lazy_static::lazy_static;
use pulldown_cmark::{CodeBlockKind, Event, OffsetIter, Options, Parser, Tag, TagEnd};

// The extensions mdbook renders with. Anything else, such as metadata blocks,
// would hide code that mdbook shows.
const MARKDOWN_OPTIONS: Options = Options::ENABLE_TABLES
    .union(Options::ENABLE_FOOTNOTES)
    .union(Options::ENABLE_STRIKETHROUGH)
    .union(Options::ENABLE_TASKLISTS)
    .union(Options::ENABLE_HEADING_ATTRIBUTES);
use regex::Regex;

lazy_static! {
    // Info strings look like `json`, `rust,ignore` or `{.yaml .numberLines}`.
    static ref INFO_TOKEN: Regex =
        Regex::new(r"[^\s,{}]+").expect("Failed to init regex for info string tokens");
}

/// A literal block of code found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Declared language, empty for indented blocks or bare fences.
    pub language: String,
    /// Full info string of the fence.
    pub info: String,
    pub source_text: String,
    /// 1-based line of the opening fence.
    pub line_number: usize,
    pub document_id: String,
}

impl CodeBlock {
    fn new(document_id: &str, info: String, line_number: usize) -> Self {
        let language = info_tokens(&info).next().unwrap_or_default().to_string();
        Self {
            language,
            info,
            source_text: String::new(),
            line_number,
            document_id: document_id.to_string(),
        }
    }

    /// Whether `name` appears in the info string after the language tag.
    pub fn has_attribute(&self, name: &str) -> bool {
        info_tokens(&self.info).skip(1).any(|token| token == name)
    }
}

fn info_tokens(info: &str) -> impl Iterator<Item = &str> {
    INFO_TOKEN
        .find_iter(info)
        .map(|token| token.as_str().trim_start_matches('.'))
        .filter(|token| !token.is_empty())
}

/// Lazily yields the code blocks of `markdown` in document order.
///
/// The markdown is only borrowed, so calling this again on the same text
/// yields the same sequence.
pub fn extract<'a>(document_id: &'a str, markdown: &'a str) -> CodeBlocks<'a> {
    CodeBlocks {
        document_id,
        events: Parser::new_ext(markdown, MARKDOWN_OPTIONS).into_offset_iter(),
        lines: LineCounter::new(markdown),
    }
}

pub struct CodeBlocks<'a> {
    document_id: &'a str,
    events: OffsetIter<'a>,
    lines: LineCounter<'a>,
}

impl Iterator for CodeBlocks<'_> {
    type Item = CodeBlock;

    fn next(&mut self) -> Option<CodeBlock> {
        let mut current: Option<CodeBlock> = None;
        for (event, range) in self.events.by_ref() {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let info = match kind {
                        CodeBlockKind::Fenced(info) => info.into_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    let line_number = self.lines.line_at(range.start);
                    current = Some(CodeBlock::new(self.document_id, info, line_number));
                }
                Event::Text(text) => {
                    if let Some(block) = current.as_mut() {
                        block.source_text.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some(block) = current.take() {
                        return Some(block);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Maps byte offsets to 1-based line numbers, scanning forward only.
struct LineCounter<'a> {
    text: &'a str,
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        if offset < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        self.line += self.text.as_bytes()[self.offset..offset]
            .iter()
            .filter(|&&byte| byte == b'\n')
            .count();
        self.offset = offset;
        self.line
    }
}
