//! Continuation-token pagination shared by every list call.

use std::future::Future;
use stratus_core::{CloudError, CloudResult};

use crate::params::Params;

/// One page of a list response.
pub trait Page {
    type Item;

    /// Items of this page and the token for the next one.
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

/// Fetch pages until one comes back empty or without a token.
///
/// The token is written into the caller's `params` under `token_key` before
/// each follow-up call, so the map ends in the state of the last request.
pub async fn paginate<P, F, Fut>(
    params: &mut Params,
    token_key: &str,
    mut fetch: F,
) -> CloudResult<Vec<P::Item>>
where
    P: Page,
    F: FnMut(Params) -> Fut,
    Fut: Future<Output = CloudResult<P>>,
{
    let mut items = Vec::new();
    loop {
        let page = fetch(params.clone()).await?;
        let (batch, token) = page.into_parts();
        if batch.is_empty() {
            break;
        }
        items.extend(batch);
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                params.set(token_key, token);
            }
            None => break,
        }
    }
    Ok(items)
}

/// The single element of a by-id lookup: none is NotFound, several is DuplicateId.
pub fn exactly_one<T>(mut items: Vec<T>, what: &str, id: &str) -> CloudResult<T> {
    match items.len() {
        0 => Err(CloudError::NotFound(format!("{} {}", what, id))),
        1 => Ok(items.remove(0)),
        n => Err(CloudError::DuplicateId(format!("{} {} matched {} resources", what, id, n))),
    }
}
