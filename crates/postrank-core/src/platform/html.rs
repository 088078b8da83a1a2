//! ============================================================================
//! HTML handling - post bodies to plain text, article extraction
//! ============================================================================
//! Post content arrives as HTML fragments. Linked news articles are reduced to
//! their body text with per-site CSS selectors, falling back to `article`.
//! ============================================================================

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

const TAGESSCHAU_SELECTOR: &str = "#content article > *:not(div.meldungsfooter)";
const ZDF_HEUTE_SELECTOR: &str = "main > div";
const HEISE_SELECTOR: &str = "article > *:not(p.printversion__back-to-article)";
const BW_SELECTOR: &str = "article > header, article > .article__body";
const SWR_SELECTOR: &str =
    "main h1.headline, main .detail-body p.lead, main .bodytext h2, main .bodytext p, main .bodytext figure.quote";
const DEUTSCHLANDFUNK_SELECTOR: &str = "article.b-article > header > *:not(.article-header-actions, .article-header-meta), .article-details-text, .article-details-title";
const T3N_SELECTOR: &str =
    "div.c-entry > div > p:not(.tg-crosslinks), div.c-entry > p:not(.tg-crosslinks), div.c-entry h2";
const NDR_SELECTOR: &str = "article p, article h2";
const T_ONLINE_SELECTOR: &str = "article div[data-testid=\"StreamLayout.Stream\"] p, article div[data-testid=\"StreamLayout.Stream\"] h3, article div[data-testid=\"StreamLayout.Stream\"] ul:not([data-testid=\"RelatedArticles.List\"]) li";
const NTV_SELECTOR: &str = "article.article .article__text p, article.article .article__text h2";
const DEFAULT_SELECTOR: &str = "article";

/// Elements that separate words when flattened
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "tr", "td", "section", "article", "header", "footer", "figure",
];

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            let block = BLOCK_ELEMENTS.iter().any(|b| *b == name);
            if block {
                out.push(' ');
            }
            collect_text(child_el, out);
            if block {
                out.push(' ');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flatten an HTML fragment to whitespace-normalised text.
/// Inline markup (links, spans) does not introduce spaces; block elements do.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    collect_text(fragment.root_element(), &mut out);
    collapse_whitespace(&out)
}

/// Where to fetch an article and which selector extracts its body
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRequest {
    pub url: Url,
    pub selector: &'static str,
}

/// Map a link to the fetch URL and body selector for its site.
/// Returns None for links that are not http(s).
pub fn article_request(link: &str) -> Option<ArticleRequest> {
    let mut url = Url::parse(link.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    let selector = if link.contains("tagesschau.de") {
        TAGESSCHAU_SELECTOR
    } else if link.contains("zdfheute.de") {
        ZDF_HEUTE_SELECTOR
    } else if link.contains("heise.de") {
        // print view carries the full article without paging
        url.query_pairs_mut().append_pair("view", "print");
        HEISE_SELECTOR
    } else if link.contains("baden-wuerttemberg.de") {
        BW_SELECTOR
    } else if link.contains("swr.de") {
        SWR_SELECTOR
    } else if link.contains("deutschlandfunk.de") {
        DEUTSCHLANDFUNK_SELECTOR
    } else if link.contains("t3n.de") {
        T3N_SELECTOR
    } else if link.contains("ndr.de") {
        NDR_SELECTOR
    } else if link.contains("t-online.de") {
        T_ONLINE_SELECTOR
    } else if link.contains("ntv.de") || link.contains("n-tv.de") {
        NTV_SELECTOR
    } else {
        DEFAULT_SELECTOR
    };

    Some(ArticleRequest { url, selector })
}

/// Join the text of every element matching `selector`, one per line.
/// None when nothing readable matched.
pub fn extract_article(html: &str, selector: &str) -> Option<String> {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(e) => {
            debug!("Invalid article selector '{}': {:?}", selector, e);
            return None;
        }
    };

    let document = Html::parse_document(html);
    let parts: Vec<String> = document
        .select(&selector)
        .map(|el| {
            let mut text = String::new();
            collect_text(el, &mut text);
            collapse_whitespace(&text)
        })
        .filter(|t| !t.is_empty())
        .collect();

    let joined = parts.join("\n");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}
