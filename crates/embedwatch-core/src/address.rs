//! Embed address building
//!
//! Addresses are derived purely from an [`Identifiers`] set. The controller
//! compares them byte-for-byte to decide whether a frame must be recreated,
//! so the builder must stay deterministic and side-effect-free.

use crate::{EmbedConfig, Error, Identifiers, Result};
use url::Url;

/// Build the embed address for an identifier set
///
/// Path selection, in priority order:
/// 1. item and collection: item path with the collection parameter
/// 2. collection only: the reserved collection item path with the collection parameter
/// 3. item only: item path
///
/// The capability parameter (when `api_flag` is set) and the offset parameter
/// follow, in that order.
pub fn build_address(ids: &Identifiers, config: &EmbedConfig) -> Result<String> {
    let (item, collection) = match (ids.primary_id.as_deref(), ids.collection_id.as_deref()) {
        (Some(item), Some(collection)) => (item, Some(collection)),
        (None, Some(collection)) => (config.collection_item.as_str(), Some(collection)),
        (Some(item), None) => (item, None),
        (None, None) => return Err(Error::MissingIdentifiers),
    };

    let mut url = Url::parse(&config.embed_base)
        .map_err(|e| Error::InvalidAddress(format!("{}: {e}", config.embed_base)))?;

    url.path_segments_mut()
        .map_err(|_| Error::InvalidAddress(config.embed_base.clone()))?
        .pop_if_empty()
        .push(item);

    let mut params: Vec<(&str, String)> = Vec::with_capacity(3);
    if let Some(collection) = collection {
        params.push((config.collection_param.as_str(), collection.to_string()));
    }
    if ids.api_flag {
        params.push((config.capability_param.as_str(), "1".to_string()));
    }
    if let Some(offset) = ids.offset_seconds {
        params.push((config.offset_param.as_str(), offset.to_string()));
    }

    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (name, value) in &params {
            query.append_pair(name, value);
        }
    }

    Ok(url.into())
}

/// Whether an address already requests the scripting capability
pub fn has_capability_flag(address: &str, param: &str) -> bool {
    match Url::parse(address) {
        Ok(url) => url.query_pairs().any(|(k, v)| k == param && v == "1"),
        Err(_) => {
            let flag = format!("{param}=1");
            address
                .split(['?', '&'])
                .skip(1)
                .any(|pair| pair == flag)
        }
    }
}

/// Return the address with the capability parameter added, or `None` when
/// it is already present.
pub fn with_capability_flag(address: &str, param: &str) -> Option<String> {
    if has_capability_flag(address, param) {
        return None;
    }

    match Url::parse(address) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(param, "1");
            Some(url.into())
        }
        Err(_) => {
            let separator = if address.contains('?') { '&' } else { '?' };
            Some(format!("{address}{separator}{param}=1"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmbedConfig {
        EmbedConfig::default()
    }

    #[test]
    fn test_single_item_has_no_query() {
        let ids = Identifiers::item("abc12345678");
        let address = build_address(&ids, &config()).unwrap();
        assert_eq!(address, "https://www.youtube.com/embed/abc12345678");
    }

    #[test]
    fn test_item_in_collection_with_all_params() {
        let ids = Identifiers::item("abc12345678")
            .with_collection("PL1")
            .with_api_flag(true)
            .with_offset(42);
        let address = build_address(&ids, &config()).unwrap();
        assert_eq!(
            address,
            "https://www.youtube.com/embed/abc12345678?list=PL1&enablejsapi=1&start=42"
        );
    }

    #[test]
    fn test_collection_only_uses_reserved_item() {
        let ids = Identifiers::collection("PLxyz");
        let address = build_address(&ids, &config()).unwrap();
        assert_eq!(address, "https://www.youtube.com/embed/videoseries?list=PLxyz");
    }

    #[test]
    fn test_offset_without_flag() {
        let ids = Identifiers::item("abc12345678").with_offset(0);
        let address = build_address(&ids, &config()).unwrap();
        assert_eq!(address, "https://www.youtube.com/embed/abc12345678?start=0");
    }

    #[test]
    fn test_missing_ids_is_construction_error() {
        let ids = Identifiers::default().with_offset(5).with_api_flag(true);
        assert_eq!(build_address(&ids, &config()), Err(Error::MissingIdentifiers));
    }

    #[test]
    fn test_dynamic_segments_are_encoded() {
        let ids = Identifiers::item("a/b c").with_collection("P&L=1");
        let address = build_address(&ids, &config()).unwrap();
        assert!(address.starts_with("https://www.youtube.com/embed/a%2Fb%20c?"));
        assert!(address.ends_with("list=P%26L%3D1"));
    }

    #[test]
    fn test_builder_is_deterministic() {
        let sets = [
            Identifiers::item("abc12345678"),
            Identifiers::collection("PL1").with_offset(3),
            Identifiers::item("abc12345678").with_collection("PL1").with_api_flag(true),
        ];
        for ids in &sets {
            assert_eq!(
                build_address(ids, &config()).unwrap(),
                build_address(&ids.clone(), &config()).unwrap()
            );
        }
    }

    #[test]
    fn test_capability_flag_added_once() {
        let plain = "https://www.youtube.com/embed/abc12345678";
        let flagged = with_capability_flag(plain, "enablejsapi").unwrap();
        assert_eq!(flagged, "https://www.youtube.com/embed/abc12345678?enablejsapi=1");
        assert_eq!(with_capability_flag(&flagged, "enablejsapi"), None);

        let with_list = "https://www.youtube.com/embed/abc12345678?list=PL1";
        assert_eq!(
            with_capability_flag(with_list, "enablejsapi").unwrap(),
            "https://www.youtube.com/embed/abc12345678?list=PL1&enablejsapi=1"
        );
    }

    #[test]
    fn test_capability_flag_on_relative_address() {
        assert!(has_capability_flag("/embed/x?a=b&enablejsapi=1", "enablejsapi"));
        assert_eq!(
            with_capability_flag("/embed/x?a=b", "enablejsapi").unwrap(),
            "/embed/x?a=b&enablejsapi=1"
        );
    }
}
