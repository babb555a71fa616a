//! Search query input, validation and rendering to transport parameters.

use serde::{Deserialize, Serialize};

use crate::error::{Error, FieldError, FieldErrors, Result};
use crate::http_client::RenderedRequest;
use crate::models::{
    Filter, Group, Lang, Order, Server, Sort, DOCS_DEFAULT, DOCS_MAX, DOCS_MIN, LIMIT_DEFAULT,
    LIMIT_MAX, LIMIT_MIN, PAGE_DEFAULT, PAGE_MIN, QUERY_MAX, REGION_MIN, SNIPPETS_DEFAULT,
    SNIPPETS_MAX, SNIPPETS_MIN,
};

/// Raw search parameters as a caller or a config file supplies them.
///
/// Everything except `query` may be left unset. Unset is kept distinct from
/// the default value because it changes which parameters get rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub query: String,
    pub lang: Option<String>,
    pub region: Option<i64>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub group: Option<String>,
    pub docs: Option<i64>,
    pub snippets: Option<i64>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
    pub show_captcha: Option<bool>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn region(mut self, region: i64) -> Self {
        self.region = Some(region);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn docs(mut self, docs: i64) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn snippets(mut self, snippets: i64) -> Self {
        self.snippets = Some(snippets);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn show_captcha(mut self, show: bool) -> Self {
        self.show_captcha = Some(show);
        self
    }

    /// Fill every unset field from `defaults`. Fields set here win.
    pub fn with_defaults(&self, defaults: &SearchQuery) -> SearchQuery {
        SearchQuery {
            query: if self.query.trim().is_empty() {
                defaults.query.clone()
            } else {
                self.query.clone()
            },
            lang: self.lang.clone().or_else(|| defaults.lang.clone()),
            region: self.region.or(defaults.region),
            filter: self.filter.clone().or_else(|| defaults.filter.clone()),
            sort: self.sort.clone().or_else(|| defaults.sort.clone()),
            order: self.order.clone().or_else(|| defaults.order.clone()),
            group: self.group.clone().or_else(|| defaults.group.clone()),
            docs: self.docs.or(defaults.docs),
            snippets: self.snippets.or(defaults.snippets),
            limit: self.limit.or(defaults.limit),
            page: self.page.or(defaults.page),
            show_captcha: self.show_captcha.or(defaults.show_captcha),
        }
    }
}

/// A query that passed validation for one server. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    server: Server,
    query: String,
    lang: Option<Lang>,
    region: Option<u32>,
    filter: Option<Filter>,
    sort: Option<Sort>,
    order: Option<Order>,
    group: Option<Group>,
    docs: Option<u32>,
    snippets: Option<u32>,
    limit: Option<u32>,
    page: Option<u32>,
    show_captcha: bool,
}

/// Trimmed value, `None` when blank.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_enum<T>(errors: &mut Vec<FieldError>, field: &'static str, value: Option<&str>) -> Option<T>
where
    T: std::str::FromStr<Err = String>,
{
    let value = present(value)?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(message) => {
            errors.push(FieldError::new(field, message));
            None
        }
    }
}

fn bounded(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<i64>,
    min: u32,
    max: Option<u32>,
) -> Option<u32> {
    let value = value?;
    if value < i64::from(min) {
        errors.push(FieldError::new(field, format!("must be at least {}", min)));
        return None;
    }
    let upper = max.unwrap_or(u32::MAX);
    if value > i64::from(upper) {
        errors.push(FieldError::new(field, format!("must be at most {}", upper)));
        return None;
    }
    u32::try_from(value).ok()
}

/// Check every field of `input` against the rules for `server`.
///
/// Collects one error per rejected field instead of stopping at the first.
pub fn validate(input: &SearchQuery, server: Server) -> Result<ValidatedQuery> {
    let mut errors = Vec::new();

    let query = input.query.trim().to_string();
    if query.is_empty() {
        errors.push(FieldError::new("query", "is required"));
    } else if query.chars().count() > QUERY_MAX {
        errors.push(FieldError::new(
            "query",
            format!("must be at most {} characters", QUERY_MAX),
        ));
    }

    let lang = parse_enum::<Lang>(&mut errors, "lang", input.lang.as_deref()).and_then(|lang| {
        let allowed = Lang::allowed_for(server);
        if allowed.contains(&lang) {
            Some(lang)
        } else {
            let list: Vec<&str> = allowed.iter().map(|l| l.as_str()).collect();
            errors.push(FieldError::new(
                "lang",
                format!(
                    "'{}' is not available on {} (allowed: {})",
                    lang,
                    server,
                    list.join(",")
                ),
            ));
            None
        }
    });

    let region = match input.region {
        Some(_) if !server.supports_region() => {
            errors.push(FieldError::new(
                "region",
                format!("is not supported on {}", server),
            ));
            None
        }
        value => bounded(&mut errors, "region", value, REGION_MIN, None),
    };

    let filter = parse_enum::<Filter>(&mut errors, "filter", input.filter.as_deref());
    let sort = parse_enum::<Sort>(&mut errors, "sort", input.sort.as_deref());
    let order = parse_enum::<Order>(&mut errors, "order", input.order.as_deref());
    let group = parse_enum::<Group>(&mut errors, "group", input.group.as_deref());

    let docs = bounded(&mut errors, "docs", input.docs, DOCS_MIN, Some(DOCS_MAX));
    let snippets = bounded(
        &mut errors,
        "snippets",
        input.snippets,
        SNIPPETS_MIN,
        Some(SNIPPETS_MAX),
    );
    let limit = bounded(&mut errors, "limit", input.limit, LIMIT_MIN, Some(LIMIT_MAX));
    let page = bounded(&mut errors, "page", input.page, PAGE_MIN, None);

    if !errors.is_empty() {
        return Err(Error::Validation(FieldErrors(errors)));
    }

    Ok(ValidatedQuery {
        server,
        query,
        lang,
        region,
        filter,
        sort,
        order,
        group,
        docs,
        snippets,
        limit,
        page,
        show_captcha: input.show_captcha.unwrap_or(false),
    })
}

impl ValidatedQuery {
    pub fn server(&self) -> Server {
        self.server
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn lang(&self) -> Option<Lang> {
        self.lang
    }

    pub fn region(&self) -> Option<u32> {
        self.region
    }

    pub fn show_captcha(&self) -> bool {
        self.show_captcha
    }

    pub fn effective_filter(&self) -> Filter {
        self.filter.unwrap_or_default()
    }

    pub fn effective_sort(&self) -> Sort {
        self.sort.unwrap_or_default()
    }

    pub fn effective_order(&self) -> Order {
        self.order.unwrap_or_default()
    }

    pub fn effective_group(&self) -> Group {
        self.group.unwrap_or_default()
    }

    /// Documents per group; flat grouping always has one.
    pub fn effective_docs(&self) -> u32 {
        match self.effective_group() {
            Group::Deep => self.docs.unwrap_or(DOCS_DEFAULT),
            Group::Flat => DOCS_MIN,
        }
    }

    pub fn effective_snippets(&self) -> u32 {
        self.snippets.unwrap_or(SNIPPETS_DEFAULT)
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(LIMIT_DEFAULT)
    }

    pub fn effective_page(&self) -> u32 {
        self.page.unwrap_or(PAGE_DEFAULT)
    }

    /// Composite `sortby` value, rendered only when sort or order is set.
    fn sortby(&self) -> Option<String> {
        if self.sort.is_none() && self.order.is_none() {
            return None;
        }
        let sort = self.effective_sort();
        match (sort, self.order) {
            (Sort::Tm, Some(order)) => Some(format!("{}.order={}", sort, order)),
            _ => Some(sort.to_string()),
        }
    }

    /// Composite `groupby` value, rendered when group, docs or limit is set.
    fn groupby(&self) -> Option<String> {
        if self.group.is_none() && self.docs.is_none() && self.limit.is_none() {
            return None;
        }
        let group = self.effective_group();
        let attr = match group {
            Group::Deep => "d",
            Group::Flat => "\"\"",
        };
        Some(format!(
            "attr={}.mode={}.groups-on-page={}.docs-in-group={}",
            attr,
            group,
            self.effective_limit(),
            self.effective_docs()
        ))
    }

    /// Ordered transport parameters. Unset simple fields are omitted.
    pub fn render(&self, login: &str, api_key: &str) -> RenderedRequest {
        let mut params: Vec<(&'static str, String)> = vec![
            ("user", login.to_string()),
            ("key", api_key.to_string()),
            ("query", self.query.clone()),
        ];

        if let Some(lang) = self.lang {
            params.push(("l10n", lang.to_string()));
        }
        if let Some(region) = self.region {
            params.push(("lr", region.to_string()));
        }
        if let Some(filter) = self.filter {
            params.push(("filter", filter.to_string()));
        }
        if let Some(snippets) = self.snippets {
            params.push(("maxpassages", snippets.to_string()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        if let Some(sortby) = self.sortby() {
            params.push(("sortby", sortby));
        }
        if let Some(groupby) = self.groupby() {
            params.push(("groupby", groupby));
        }
        if self.show_captcha {
            params.push(("showmecaptcha", "yes".to_string()));
        }

        RenderedRequest::new(self.server, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(request: &RenderedRequest) -> Vec<&'static str> {
        request.params.iter().map(|(k, _)| *k).collect()
    }

    fn rendered(query: SearchQuery) -> RenderedRequest {
        validate(&query, Server::Ru).unwrap().render("alice", "secret")
    }

    #[test]
    fn test_minimal_query_renders_only_required() {
        let request = rendered(SearchQuery::new("  rust  "));
        assert_eq!(names(&request), vec!["user", "key", "query"]);
        assert_eq!(request.param("query"), Some("rust"));
    }

    #[test]
    fn test_full_query_order() {
        let request = rendered(
            SearchQuery::new("rust")
                .lang("uk")
                .region(213)
                .filter("strict")
                .snippets(3)
                .page(2)
                .sort("tm")
                .order("ascending")
                .group("flat")
                .limit(10)
                .show_captcha(true),
        );
        assert_eq!(
            names(&request),
            vec![
                "user",
                "key",
                "query",
                "l10n",
                "lr",
                "filter",
                "maxpassages",
                "page",
                "sortby",
                "groupby",
                "showmecaptcha"
            ]
        );
        assert_eq!(request.param("sortby"), Some("tm.order=ascending"));
        assert_eq!(
            request.param("groupby"),
            Some("attr=\"\".mode=flat.groups-on-page=10.docs-in-group=1")
        );
        assert_eq!(request.param("showmecaptcha"), Some("yes"));
    }

    #[test]
    fn test_sortby_combinations() {
        let sortby = |q: SearchQuery| rendered(q).param("sortby").map(str::to_string);

        assert_eq!(sortby(SearchQuery::new("q")), None);
        // Order alone still renders, but only time sorting carries it.
        assert_eq!(
            sortby(SearchQuery::new("q").order("ascending")),
            Some("rlv".to_string())
        );
        assert_eq!(sortby(SearchQuery::new("q").sort("tm")), Some("tm".to_string()));
        assert_eq!(
            sortby(SearchQuery::new("q").sort("tm").order("descending")),
            Some("tm.order=descending".to_string())
        );
        assert_eq!(
            sortby(SearchQuery::new("q").sort("rlv").order("ascending")),
            Some("rlv".to_string())
        );
    }

    #[test]
    fn test_groupby_combinations() {
        let groupby = |q: SearchQuery| rendered(q).param("groupby").map(str::to_string);

        assert_eq!(groupby(SearchQuery::new("q")), None);
        assert_eq!(
            groupby(SearchQuery::new("q").limit(20)),
            Some("attr=d.mode=deep.groups-on-page=20.docs-in-group=1".to_string())
        );
        assert_eq!(
            groupby(SearchQuery::new("q").docs(3)),
            Some("attr=d.mode=deep.groups-on-page=50.docs-in-group=3".to_string())
        );
        assert_eq!(
            groupby(SearchQuery::new("q").group("flat").docs(3)),
            Some("attr=\"\".mode=flat.groups-on-page=50.docs-in-group=1".to_string())
        );
    }

    #[test]
    fn test_captcha_false_is_omitted() {
        let request = rendered(SearchQuery::new("q").show_captcha(false));
        assert_eq!(request.param("showmecaptcha"), None);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let query = SearchQuery::new("q").sort("tm").limit(5).lang("ru");
        assert_eq!(
            rendered(query.clone()).signature(),
            rendered(query).signature()
        );
    }

    #[test]
    fn test_lang_depends_on_server() {
        let query = SearchQuery::new("q").lang("tr");
        let err = validate(&query, Server::Ru).unwrap_err();
        assert!(err.field_errors().unwrap().has("lang"));

        assert!(validate(&query, Server::Tr).is_ok());

        let err = validate(&SearchQuery::new("q").lang("en"), Server::Tr).unwrap_err();
        assert!(err.field_errors().unwrap().has("lang"));

        assert!(validate(&SearchQuery::new("q").lang("en"), Server::Com).is_ok());
        // Blank means unset.
        assert!(validate(&SearchQuery::new("q").lang("  "), Server::Com).is_ok());
    }

    #[test]
    fn test_region_rules() {
        let err = validate(&SearchQuery::new("q").region(213), Server::Com).unwrap_err();
        assert_eq!(
            err.field_errors().unwrap().for_field("region"),
            vec!["is not supported on yandex.com"]
        );

        let err = validate(&SearchQuery::new("q").region(0), Server::Ru).unwrap_err();
        assert!(err.field_errors().unwrap().has("region"));

        let ok = validate(&SearchQuery::new("q").region(11508), Server::Tr).unwrap();
        assert_eq!(ok.region(), Some(11508));
    }

    #[test]
    fn test_collects_one_error_per_field() {
        let query = SearchQuery {
            query: "   ".to_string(),
            filter: Some("family".to_string()),
            docs: Some(4),
            snippets: Some(0),
            limit: Some(101),
            page: Some(-1),
            ..Default::default()
        };
        let err = validate(&query, Server::Ru).unwrap_err();
        let errors = err.field_errors().unwrap();
        for field in ["query", "filter", "docs", "snippets", "limit", "page"] {
            assert_eq!(errors.for_field(field).len(), 1, "{}", field);
        }
        assert_eq!(errors.for_field("limit"), vec!["must be at most 100"]);
    }

    #[test]
    fn test_query_length_counts_characters() {
        let long = "я".repeat(QUERY_MAX);
        assert!(validate(&SearchQuery::new(long.clone()), Server::Ru).is_ok());
        let err = validate(&SearchQuery::new(long + "я"), Server::Ru).unwrap_err();
        assert!(err.field_errors().unwrap().has("query"));
    }

    #[test]
    fn test_effective_values() {
        let q = validate(&SearchQuery::new("q"), Server::Ru).unwrap();
        assert_eq!(q.effective_filter(), Filter::Moderate);
        assert_eq!(q.effective_sort(), Sort::Rlv);
        assert_eq!(q.effective_order(), Order::Descending);
        assert_eq!(q.effective_group(), Group::Deep);
        assert_eq!(q.effective_limit(), 50);
        assert_eq!(q.effective_page(), 0);
        assert_eq!(q.effective_docs(), 1);
        assert_eq!(q.effective_snippets(), 1);
        assert!(!q.show_captcha());
    }

    #[test]
    fn test_with_defaults() {
        let defaults = SearchQuery {
            lang: Some("ru".to_string()),
            limit: Some(10),
            ..Default::default()
        };
        let merged = SearchQuery::new("q").limit(20).with_defaults(&defaults);
        assert_eq!(merged.query, "q");
        assert_eq!(merged.lang.as_deref(), Some("ru"));
        assert_eq!(merged.limit, Some(20));
        assert_eq!(merged.page, None);
    }
}
