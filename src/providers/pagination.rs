//! Walks a paginated REST listing by following RFC-5988 `Link` headers.

use super::FetchError;
use async_stream::try_stream;
use futures::stream::Stream;
use log::{debug, log_enabled, trace, Level};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;

/// One decoded page plus the link to the next one, if any.
pub(crate) struct Page<T> {
    pub next: Option<Url>,
    pub items: Vec<T>,
}

/// Lazily yield every item from every page, starting at `first_page`.
pub(crate) fn paginated<T, P, F>(
    client: Client,
    first_page: Url,
    headers: HeaderMap,
    mut parse: P,
) -> impl Stream<Item = Result<T, FetchError>>
where
    P: FnMut(Response) -> F,
    F: Future<Output = Result<Page<T>, FetchError>>,
{
    try_stream! {
        let mut page = Some(first_page);

        while let Some(next_page) = page {
            debug!("Sending request to {}", next_page);
            let response = client
                .get(next_page)
                .headers(headers.clone())
                .send()
                .await?;

            let Page { next, items } = parse(response).await?;

            for item in items {
                yield item;
            }
            page = next;
        }
    }
}

/// Check the status, pull out the next-page link, then decode the body.
pub(crate) async fn decode_page<T>(response: Response) -> Result<(Option<Url>, T), FetchError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let url = response.url().to_string();
    debug!("Received response ({})", status);

    if !status.is_success() {
        return Err(FetchError::BadResponse { status, url });
    }

    let next = next_url(response.headers());
    let raw: Value = response.json().await?;

    if log_enabled!(Level::Trace) {
        let pretty = serde_json::to_string_pretty(&raw).unwrap_or_default();
        for line in pretty.lines() {
            trace!("{}", line);
        }
    }

    let body = serde_json::from_value(raw).map_err(FetchError::BadBody)?;
    Ok((next, body))
}

fn next_url(headers: &HeaderMap) -> Option<Url> {
    let raw = headers.get(LINK)?.to_str().ok()?;
    next_link(raw).and_then(|link| Url::parse(link).ok())
}

fn next_link(header: &str) -> Option<&str> {
    header
        .split(',')
        .filter_map(|value| {
            let mut pieces = value.splitn(2, ';');
            let target = pieces.next()?.trim();
            let params = pieces.next()?;

            if params.split(';').any(|p| p.trim() == "rel=\"next\"") {
                Some(target.trim_start_matches('<').trim_end_matches('>'))
            } else {
                None
            }
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_next_link() {
        let src = r#"<https://api.github.com/user/repos?page=2>; rel="next", <https://api.github.com/user/repos?page=3>; rel="last""#;

        let should_be = "https://api.github.com/user/repos?page=2";
        let got = next_link(src).unwrap();

        assert_eq!(got, should_be);
    }

    #[test]
    fn no_next_relation_means_no_more_pages() {
        let src = r#"<https://api.github.com/user/repos?page=3>; rel="last""#;

        assert!(next_link(src).is_none());
    }

    #[test]
    fn next_url_is_read_from_the_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            r#"<https://example.com/projects?page=2>; rel="next""#.parse().unwrap(),
        );

        let got = next_url(&headers).unwrap();

        assert_eq!(got.as_str(), "https://example.com/projects?page=2");
    }
}
