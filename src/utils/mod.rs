use mdbook::book::{Book, BookItem};

/// Collects `(document id, markdown)` for every chapter that has a file.
/// Draft chapters have no content and are left out.
pub fn chapters(book: &Book) -> Vec<(String, String)> {
    book.iter()
        .filter_map(|item| match item {
            BookItem::Chapter(chapter) if chapter.path.is_some() => {
                let document_id = chapter
                    .source_path
                    .as_ref()
                    .or(chapter.path.as_ref())
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| chapter.name.clone());
                Some((document_id, chapter.content.clone()))
            }
            _ => None,
        })
        .collect()
}
