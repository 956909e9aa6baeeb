// Index writer handle
//
// All write operations to the inverted index go through this handle. There
// is exactly one per workspace; replace-by-primary-key semantics are a
// delete_term on `path` followed by add_document under the same writer.

use crate::error::EngineResult;
use crate::search::schema::{DocumentSchema, FileDocument};
use tantivy::merge_policy::LogMergePolicy;
use tantivy::{Index, IndexWriter, TantivyDocument, Term};
use tracing::debug;

/// Merge policy leans toward fewer, larger segments
const MIN_SEGMENTS_TO_MERGE: usize = 5;

pub struct IndexWriterHandle {
    writer: IndexWriter<TantivyDocument>,
    schema: DocumentSchema,
    pending_ops: usize,
}

impl IndexWriterHandle {
    pub(super) fn new(
        index: &Index,
        schema: DocumentSchema,
        heap_bytes: usize,
    ) -> EngineResult<Self> {
        let writer = index.writer::<TantivyDocument>(heap_bytes)?;

        let mut merge_policy = LogMergePolicy::default();
        merge_policy.set_min_num_segments(MIN_SEGMENTS_TO_MERGE);
        writer.set_merge_policy(Box::new(merge_policy));

        Ok(Self {
            writer,
            schema,
            pending_ops: 0,
        })
    }

    /// Replace the document for a path, or add it if absent
    pub fn add_or_replace(&mut self, document: &FileDocument) -> EngineResult<()> {
        let term = Term::from_field_text(self.schema.fields.path, &document.path);
        self.writer.delete_term(term);
        self.writer.add_document(document.to_document(&self.schema))?;
        self.pending_ops += 1;
        Ok(())
    }

    /// Delete a path's document. Idempotent.
    pub fn delete(&mut self, path: &str) -> EngineResult<()> {
        let term = Term::from_field_text(self.schema.fields.path, path);
        self.writer.delete_term(term);
        self.pending_ops += 1;
        Ok(())
    }

    /// Make pending operations durable. Returns the commit opstamp.
    pub fn commit(&mut self) -> EngineResult<u64> {
        let opstamp = self.writer.commit()?;
        debug!(
            "Index commit at opstamp {} ({} ops)",
            opstamp, self.pending_ops
        );
        self.pending_ops = 0;
        Ok(opstamp)
    }

    /// Discard everything since the last commit (cancellation path)
    pub fn rollback(&mut self) -> EngineResult<u64> {
        let opstamp = self.writer.rollback()?;
        self.pending_ops = 0;
        Ok(opstamp)
    }

    /// Operations staged since the last commit
    pub fn pending_ops(&self) -> usize {
        self.pending_ops
    }
}

#[cfg(test)]
mod tests {
    use crate::search::engine::SearchIndex;
    use crate::search::schema::FileDocument;

    fn doc(path: &str, content: &str) -> FileDocument {
        FileDocument {
            path: path.to_string(),
            language: "rust".to_string(),
            content: content.to_string(),
            content_hash: crate::extractors::content_hash(content.as_bytes()),
            size: content.len() as i64,
            last_modified: 0,
            symbols: Vec::new(),
        }
    }

    #[test]
    fn test_delete_is_idempotent() {
        let index = SearchIndex::in_memory().unwrap();
        let mut writer = index.writer(50_000_000).unwrap();

        writer.add_or_replace(&doc("a.rs", "alpha")).unwrap();
        writer.commit().unwrap();

        writer.delete("a.rs").unwrap();
        writer.delete("a.rs").unwrap();
        writer.delete("never-existed.rs").unwrap();
        writer.commit().unwrap();
        index.refresh().unwrap();

        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn test_rollback_discards_uncommitted() {
        let index = SearchIndex::in_memory().unwrap();
        let mut writer = index.writer(50_000_000).unwrap();

        writer.add_or_replace(&doc("kept.rs", "kept")).unwrap();
        writer.commit().unwrap();

        writer.add_or_replace(&doc("discarded.rs", "gone")).unwrap();
        assert_eq!(writer.pending_ops(), 1);
        writer.rollback().unwrap();
        assert_eq!(writer.pending_ops(), 0);

        index.refresh().unwrap();
        assert_eq!(index.num_docs(), 1);
    }
}
