// Rich-text link facets.
//
// Bluesky does not auto-link URLs in post text; clients only render links
// that carry an `app.bsky.richtext.facet#link` facet. Facet indices are UTF-8
// byte offsets into the text.

use serde::Serialize;

use crate::reply::links::url_spans;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
}

/// One link facet per URL in `text`.
pub fn link_facets(text: &str) -> Vec<Facet> {
    url_spans(text)
        .into_iter()
        .map(|(start, end)| Facet {
            index: ByteSlice {
                byte_start: start,
                byte_end: end,
            },
            features: vec![FacetFeature::Link {
                uri: text[start..end].to_string(),
            }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_urls_no_facets() {
        assert!(link_facets("just words").is_empty());
    }

    #[test]
    fn offsets_count_bytes_not_chars() {
        let text = "👋 https://x.example/y\n\nhi";
        let facets = link_facets(text);
        assert_eq!(facets.len(), 1);
        // the emoji is 4 bytes, plus one space
        assert_eq!(facets[0].index.byte_start, 5);
        assert_eq!(facets[0].index.byte_end, 5 + "https://x.example/y".len());
    }

    #[test]
    fn serializes_in_lexicon_shape() {
        let facets = link_facets("https://x.example");
        let json = serde_json::to_value(&facets).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "index": {"byteStart": 0, "byteEnd": 17},
                "features": [{"$type": "app.bsky.richtext.facet#link", "uri": "https://x.example"}]
            }])
        );
    }
}
