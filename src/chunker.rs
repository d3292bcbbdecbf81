//! # Chunker Module
//!
//! Divide un batch ordinato in gruppi contigui di dimensione fissa.
//!
//! Ogni chiamata a [`chunk`] produce un iteratore nuovo e indipendente:
//! nessun cursore condiviso è esposto al chiamante. L'ultimo chunk può
//! essere più corto, un input vuoto produce zero chunk.

use crate::error::{UploadError, UploadResult};
use std::ops::Range;

/// Lazy iterator over ordered, contiguous sub-slices
#[derive(Debug, Clone)]
pub struct Chunks<'a, T> {
    items: &'a [T],
    size: usize,
}

impl<'a, T> Iterator for Chunks<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.items.is_empty() {
            return None;
        }
        let take = self.size.min(self.items.len());
        let (head, tail) = self.items.split_at(take);
        self.items = tail;
        Some(head)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len().div_ceil(self.size);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Chunks<'_, T> {}

fn check_size(size: usize) -> UploadResult<()> {
    if size == 0 {
        return Err(UploadError::InvalidConfiguration(
            "Chunk size must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Split `items` into chunks of at most `size` elements
pub fn chunk<T>(items: &[T], size: usize) -> UploadResult<Chunks<'_, T>> {
    check_size(size)?;
    Ok(Chunks { items, size })
}

/// Eager variant: chunk boundaries as index ranges over `0..len`
pub fn chunk_ranges(len: usize, size: usize) -> UploadResult<Vec<Range<usize>>> {
    check_size(size)?;
    Ok((0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect())
}
