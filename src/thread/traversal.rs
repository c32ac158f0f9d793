use crate::model::Comment;
use crate::thread::CommentTreeBuilder;
use crate::HarvestError;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// A fetched item together with the ids of its direct replies
///
/// `comment` is `None` for items that exist but are not shown (deleted or
/// dead); their replies are still followed.
#[derive(Debug, Clone)]
pub struct FetchedComment {
    pub comment: Option<Comment>,
    pub kids: Vec<String>,
}

/// Outcome of a breadth-first thread fetch
#[derive(Debug, Default)]
pub struct ThreadFetch {
    /// Comments in thread order
    pub comments: Vec<Comment>,
    /// Items that failed to fetch, with their ids
    pub failures: Vec<(String, HarvestError)>,
    /// Number of item fetches issued
    pub requests: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
struct Pending {
    id: String,
    depth: u32,
    parent_id: Option<String>,
}

/// Breadth-first, depth-bounded fetch of a comment tree given by child ids
#[derive(Debug, Clone, Copy)]
pub struct ThreadTraversal {
    max_depth: u32,
    batch_size: usize,
}

impl ThreadTraversal {
    pub fn new(max_depth: u32, batch_size: usize) -> Self {
        Self {
            max_depth,
            batch_size: batch_size.max(1),
        }
    }

    /// Fetches every comment reachable from `top_level` within `max_depth`
    ///
    /// Each layer is fetched in batches of `batch_size` concurrent calls; the
    /// abort signal is checked before every batch. `fetch_item` returns
    /// `Ok(None)` for absent items, which end their branch. Replies under a
    /// hidden item keep it as their `parent_id` and surface as orphans.
    /// Parent links and depths are assigned from the traversal, not from the
    /// fetched payload.
    pub async fn fetch<F, Fut>(
        &self,
        top_level: Vec<String>,
        cancel: &CancellationToken,
        fetch_item: F,
    ) -> ThreadFetch
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Option<FetchedComment>, HarvestError>>,
    {
        let mut builder = CommentTreeBuilder::new();
        let mut result = ThreadFetch::default();
        let mut seen: HashSet<String> = HashSet::new();

        let mut layer: Vec<Pending> = top_level
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .map(|id| Pending {
                id,
                depth: 0,
                parent_id: None,
            })
            .collect();

        'layers: while !layer.is_empty() {
            let mut next = Vec::new();

            for batch in layer.chunks(self.batch_size) {
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    break 'layers;
                }

                let responses = join_all(batch.iter().map(|p| fetch_item(p.id.clone()))).await;
                result.requests += batch.len();

                for (pending, response) in batch.iter().zip(responses) {
                    match response {
                        Ok(Some(fetched)) => {
                            if pending.depth < self.max_depth {
                                next.extend(
                                    fetched
                                        .kids
                                        .into_iter()
                                        .filter(|id| seen.insert(id.clone()))
                                        .map(|id| Pending {
                                            id,
                                            depth: pending.depth + 1,
                                            parent_id: Some(pending.id.clone()),
                                        }),
                                );
                            }

                            match fetched.comment {
                                Some(mut comment) => {
                                    comment.parent_id = pending.parent_id.clone();
                                    comment.depth = pending.depth;
                                    builder.insert(comment);
                                }
                                None => tracing::debug!(id = %pending.id, "Skipping hidden comment"),
                            }
                        }
                        Ok(None) => {
                            tracing::debug!(id = %pending.id, "Skipping unavailable comment");
                        }
                        Err(err) => result.failures.push((pending.id.clone(), err)),
                    }
                }
            }

            layer = next;
        }

        result.comments = builder.build();
        result
    }
}
