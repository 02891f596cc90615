/*! Record types

Documents flow through the stages as:
[Document] (corpus) → [CountInfoDocument] (annotator) → [FilteredDocument] (extractor).
!*/
mod count_info;
mod document;
mod filtered;

pub use count_info::{CountInfoDocument, CountInfoRecord};
pub use document::{Document, DocumentSer};
pub use filtered::{Annotation, FilteredDocument};
