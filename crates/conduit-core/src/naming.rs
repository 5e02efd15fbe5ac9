//! Route name derivation.
//!
//! A service type name becomes its resource segment by lower-casing it,
//! stripping the first recognized suffix and converting the rest to
//! snake case. `DemoService` becomes `demo`, `OrderHandler` becomes `order`.
//! Method names are converted to snake case.

/// Suffixes recognized when no custom list is configured, in match order.
pub const DEFAULT_SUFFIXES: &[&str] = &["service", "handler", "usecase", "controller"];

/// Naming conventions applied to discovered services.
///
/// # Example
///
/// ```
/// use conduit_core::Naming;
///
/// let naming = Naming::default();
/// assert_eq!(naming.resource_name("DemoService").as_deref(), Some("demo"));
/// assert_eq!(naming.resource_name("Demo"), None);
/// assert_eq!(naming.method_name("GetFile"), "get_file");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    suffixes: Vec<String>,
}

impl Naming {
    /// Creates naming rules with the given suffixes.
    ///
    /// Suffixes are matched case-insensitively in the given order. Blank
    /// entries are ignored, and an empty list falls back to
    /// [`DEFAULT_SUFFIXES`].
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes: Vec<String> = suffixes
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if suffixes.is_empty() {
            Self::default()
        } else {
            Self { suffixes }
        }
    }

    /// Returns the recognized suffixes, lower-cased.
    #[must_use]
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Derives the resource segment for a service type name.
    ///
    /// Returns `None` when the name does not end with a recognized suffix.
    /// The result may be empty when the name is nothing but a suffix.
    #[must_use]
    pub fn resource_name(&self, type_name: &str) -> Option<String> {
        let lowered = type_name.trim().to_lowercase();
        self.suffixes
            .iter()
            .find_map(|suffix| lowered.strip_suffix(suffix.as_str()))
            .map(to_snake_case)
    }

    /// Derives the route segment for a method name.
    #[must_use]
    pub fn method_name(&self, name: &str) -> String {
        to_snake_case(name)
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Converts an identifier to snake case.
///
/// Word boundaries are a lower-case letter or digit followed by an upper-case
/// letter, the last capital of an acronym followed by a lower-case letter,
/// and any of `-`, `_`, `.` or whitespace. Runs of separators collapse into
/// one underscore; leading and trailing separators are dropped.
///
/// ```
/// use conduit_core::naming::to_snake_case;
///
/// assert_eq!(to_snake_case("SumNumbers"), "sum_numbers");
/// assert_eq!(to_snake_case("HTTPServer"), "http_server");
/// assert_eq!(to_snake_case("get-file"), "get_file");
/// ```
#[must_use]
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == '_' || c == '.' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Returns the last path segment of a Rust type name, without generics.
///
/// `my_app::services::DemoService<T>` becomes `DemoService`.
#[must_use]
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_suffixes() {
        let naming = Naming::default();
        assert_eq!(
            naming.suffixes(),
            &["service", "handler", "usecase", "controller"]
        );
    }

    #[test]
    fn test_empty_suffix_list_falls_back_to_defaults() {
        let naming = Naming::new(Vec::<String>::new());
        assert_eq!(naming, Naming::default());

        let naming = Naming::new(["", "  "]);
        assert_eq!(naming, Naming::default());
    }

    #[test]
    fn test_resource_name_strips_suffix() {
        let naming = Naming::default();
        assert_eq!(naming.resource_name("DemoService").as_deref(), Some("demo"));
        assert_eq!(naming.resource_name("OrderHandler").as_deref(), Some("order"));
        assert_eq!(naming.resource_name("LoginUseCase").as_deref(), Some("login"));
        assert_eq!(
            naming.resource_name("AccountController").as_deref(),
            Some("account")
        );
    }

    #[test]
    fn test_resource_name_lowercases_before_snake_case() {
        let naming = Naming::default();
        assert_eq!(
            naming.resource_name("UserProfileService").as_deref(),
            Some("userprofile")
        );
        assert_eq!(
            naming.resource_name("user_profile_service").as_deref(),
            Some("user_profile")
        );
    }

    #[test]
    fn test_resource_name_missing_suffix() {
        let naming = Naming::default();
        assert_eq!(naming.resource_name("Demo"), None);
        assert_eq!(naming.resource_name("ServiceDemo"), None);
    }

    #[test]
    fn test_resource_name_only_suffix_is_empty() {
        let naming = Naming::default();
        assert_eq!(naming.resource_name("Service").as_deref(), Some(""));
    }

    #[test]
    fn test_first_matching_suffix_wins() {
        let naming = Naming::new(["handlerservice", "service"]);
        assert_eq!(
            naming.resource_name("PaymentHandlerService").as_deref(),
            Some("payment")
        );

        let naming = Naming::new(["service", "handlerservice"]);
        assert_eq!(
            naming.resource_name("PaymentHandlerService").as_deref(),
            Some("paymenthandler")
        );
    }

    #[test]
    fn test_custom_suffixes_are_case_insensitive() {
        let naming = Naming::new(["API"]);
        assert_eq!(naming.resource_name("BillingApi").as_deref(), Some("billing"));
        assert_eq!(naming.resource_name("BillingService"), None);
    }

    #[test]
    fn test_method_name() {
        let naming = Naming::default();
        assert_eq!(naming.method_name("Sum"), "sum");
        assert_eq!(naming.method_name("GetFile"), "get_file");
        assert_eq!(naming.method_name("get_file"), "get_file");
        assert_eq!(naming.method_name("ListHTTPRoutes"), "list_http_routes");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("SumNumbers"), "sum_numbers");
        assert_eq!(to_snake_case("getID"), "get_id");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("v2Api"), "v2_api");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("__double--dash__"), "double_dash");
        assert_eq!(to_snake_case(""), "");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_app::services::DemoService"), "DemoService");
        assert_eq!(short_type_name("DemoService"), "DemoService");
        assert_eq!(
            short_type_name("my_app::Wrapper<my_app::Inner>"),
            "Wrapper"
        );
    }

    proptest! {
        #[test]
        fn prop_snake_case_is_idempotent(name in "[A-Za-z][A-Za-z0-9_-]{0,24}") {
            let once = to_snake_case(&name);
            prop_assert_eq!(to_snake_case(&once), once);
        }

        #[test]
        fn prop_resource_name_is_case_insensitive(name in "[A-Za-z][A-Za-z0-9]{0,16}") {
            let naming = Naming::default();
            let mixed = naming.resource_name(&format!("{name}Service"));
            let lower = naming.resource_name(&format!("{}service", name.to_lowercase()));
            let upper = naming.resource_name(&format!("{}SERVICE", name.to_uppercase()));
            prop_assert_eq!(&mixed, &lower);
            prop_assert_eq!(&mixed, &upper);
        }

        #[test]
        fn prop_resource_name_is_idempotent(name in "[A-Za-z][A-Za-z0-9]{0,16}") {
            let naming = Naming::default();
            let derived = naming.resource_name(&format!("{name}Handler")).unwrap();
            let again = naming.resource_name(&format!("{derived}Handler")).unwrap();
            prop_assert_eq!(again, derived);
        }
    }
}
