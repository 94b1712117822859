//! Streaming extraction API: emit results as each chunk completes.
//!
//! Extraction of a textbook runs for a long time. A stream lets callers show
//! partial results, persist them incrementally, or stop early by dropping the
//! stream, instead of buffering every result in memory.
//!
//! Chunks are processed strictly one at a time, so results arrive in input
//! order and each carries only its own chunk's validation state.

use crate::model::{Chunk, ExtractionResult};
use crate::pipeline::llm::{ExtractionClient, ExtractionOutcome, Transport};
use futures::stream::{self, Stream, StreamExt};

/// Stream `(result, outcome)` pairs for `chunks`, in order.
///
/// The stream borrows the client; a failed chunk yields a degraded outcome
/// rather than ending the stream.
pub fn extract_stream<'a, T, I>(
    client: &'a ExtractionClient<T>,
    chunks: I,
) -> impl Stream<Item = (ExtractionResult, ExtractionOutcome)> + 'a
where
    T: Transport,
    I: IntoIterator<Item = Chunk>,
    I::IntoIter: 'a,
{
    stream::iter(chunks).then(move |chunk| async move {
        client
            .extract_detailed(
                &chunk.chunk_id,
                &chunk.text,
                &chunk.image_refs,
                &chunk.formula_candidates,
            )
            .await
    })
}
