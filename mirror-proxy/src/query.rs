use http::HeaderMap;
use std::collections::HashMap;
use update_center::resolver::UpdateCenterQuery;

const VERSION: &str = "version";
const PROVIDER: &str = "mirror-provider";
const JSON_SERVER: &str = "mirror-jsonServer";
const EXPERIMENTAL: &str = "mirror-experimental";

/// Anything update center options can be read from.
pub trait QuerySource {
    fn get(&self, key: &str) -> Option<&str>;
}

/// Decoded query string parameters. The first occurrence of a key wins.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = HashMap::new();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params
                    .entry(key.into_owned())
                    .or_insert_with(|| value.into_owned());
            }
        }
        QueryParams(params)
    }
}

impl QuerySource for QueryParams {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl QuerySource for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }
}

/// Builds the query from the given sources. Later sources override earlier
/// ones, empty values never override.
pub fn update_center_query(sources: &[&dyn QuerySource]) -> UpdateCenterQuery {
    let mut query = UpdateCenterQuery::default();

    for source in sources {
        let non_empty = |key| source.get(key).filter(|v| !v.is_empty());

        if let Some(version) = non_empty(VERSION) {
            query.version = version.to_string();
        }
        if let Some(provider) = non_empty(PROVIDER) {
            query.provider = provider.to_string();
        }
        if let Some(json_server) = non_empty(JSON_SERVER) {
            query.json_server = json_server.to_string();
        }
        if non_empty(EXPERIMENTAL) == Some("true") {
            query.experimental = true;
        }
    }
    query
}
