use std::cmp::Reverse;

use crate::models::Prioritized;

/// Order prefetch candidates by offline priority (starred, then unread, then
/// read) and keep the first `limit`. Articles of equal priority keep their
/// original relative order.
pub fn build_offline_queue<A>(articles: &[A], limit: usize) -> Vec<A>
where
    A: Prioritized + Clone,
{
    let mut queue = articles.to_vec();
    queue.sort_by_key(|article| Reverse(article.offline_priority()));
    queue.truncate(limit);
    queue
}
