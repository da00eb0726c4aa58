use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use scraper::{Html, Selector};
use std::time::Duration;

/// Builds the HTTP client shared by all workers
pub fn build_client(request_timeout_sec: u64) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(request_timeout_sec))
        .build()?;
    Ok(client)
}

/// Issues a GET for `url`. Any status code is returned as a response;
/// only transport failures (DNS, connect, timeout, bad URL) are errors.
pub async fn fetch_page(client: &Client, url: &str) -> Result<Response> {
    let response = client.get(url).send().await?;
    Ok(response)
}

/// Reads the whole body of `response` as HTML
pub async fn read_html(response: Response) -> Result<String> {
    let bytes = response.bytes().await?;
    decode_html(&bytes)
}

/// Bodies that are not valid UTF-8 cannot be parsed for anchors
pub fn decode_html(bytes: &[u8]) -> Result<String> {
    let html = std::str::from_utf8(bytes)
        .map_err(|e| anyhow!("Body is not valid UTF-8: {}", e))?;
    Ok(html.to_string())
}

/// 2xx is the only success class
pub fn is_success(status: u16) -> bool {
    status / 100 == 2
}

/// The `href` of every `<a>` element in document order, `None` where the
/// attribute is missing. At most `limit` anchors are returned, 0 means all.
pub fn extract_anchors(html: &str, limit: usize) -> Result<Vec<Option<String>>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a")
        .map_err(|e| anyhow!("Failed to parse <a> selector: {}", e))?;

    let limit = if limit == 0 { usize::MAX } else { limit };
    let anchors = document
        .select(&selector)
        .take(limit)
        .map(|element| element.value().attr("href").map(str::to_string))
        .collect();

    Ok(anchors)
}
