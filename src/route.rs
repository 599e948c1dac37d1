//! # Route Table
//!
//! Maps `(unit id, function code, address)` to a user supplied handler.
//! Rules are checked in registration order and the first match wins, so a
//! narrow rule registered before a catch-all takes priority over it.
//!
//! Build the [`RouteMap`] once at startup and share it immutably (for
//! example behind an `Arc`) with the request pipeline.
//!
//! ```rust
//! use voltage_modbus_engine::{RouteMap, Rule};
//!
//! let mut routes = RouteMap::new();
//! routes.add_rule(
//!     Rule::new(|req| Ok(req.address as i32 % 2))
//!         .unit_ids([1])
//!         .function_codes([1, 2])
//!         .addresses(0..100),
//! );
//! assert!(routes.match_route(1, 1, 10, 0).is_some());
//! assert!(routes.match_route(2, 1, 10, 0).is_none());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::HandlerError;

/// What a handler is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerRequest {
    pub unit_id: u8,
    pub function_code: u8,
    pub address: u16,
    /// Value to write, `None` for reads.
    pub value: Option<i32>,
}

impl HandlerRequest {
    #[inline]
    pub fn is_write(&self) -> bool {
        self.value.is_some()
    }
}

/// Data handler bound to a rule.
///
/// Reads return the value at `request.address`; coils and discrete inputs
/// must return 0 or 1. Writes store `request.value` and their return value
/// is ignored. Any error is answered with Server Device Failure.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &HandlerRequest) -> Result<i32, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&HandlerRequest) -> Result<i32, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &HandlerRequest) -> Result<i32, HandlerError> {
        self(request)
    }
}

/// Set of accepted values, `Any` matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector<T: Eq + Hash> {
    #[default]
    Any,
    Only(HashSet<T>),
}

impl<T: Eq + Hash> Selector<T> {
    pub fn only<I: IntoIterator<Item = T>>(values: I) -> Self {
        Self::Only(values.into_iter().collect())
    }

    #[inline]
    pub fn contains(&self, value: &T) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(value),
        }
    }
}

/// A matching rule bound to a handler.
#[derive(Clone)]
pub struct Rule {
    handler: Arc<dyn Handler>,
    unit_ids: Selector<u8>,
    function_codes: Selector<u8>,
    addresses: Selector<u16>,
    fixed_starting_address: Option<u16>,
}

impl Rule {
    /// Rule matching every request, narrow it with the builder methods.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HandlerRequest) -> Result<i32, HandlerError> + Send + Sync + 'static,
    {
        Self::with_handler(handler)
    }

    /// Rule bound to any [`Handler`] implementation.
    pub fn with_handler<H: Handler + 'static>(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Rule sharing an existing handler.
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            unit_ids: Selector::Any,
            function_codes: Selector::Any,
            addresses: Selector::Any,
            fixed_starting_address: None,
        }
    }

    pub fn unit_ids<I: IntoIterator<Item = u8>>(mut self, ids: I) -> Self {
        self.unit_ids = Selector::only(ids);
        self
    }

    pub fn function_codes<I: IntoIterator<Item = u8>>(mut self, codes: I) -> Self {
        self.function_codes = Selector::only(codes);
        self
    }

    pub fn addresses<I: IntoIterator<Item = u16>>(mut self, addresses: I) -> Self {
        self.addresses = Selector::only(addresses);
        self
    }

    /// Only match requests whose starting address is `address`.
    pub fn fixed_starting_address(mut self, address: u16) -> Self {
        self.fixed_starting_address = Some(address);
        self
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn matches(&self, unit_id: u8, function_code: u8, address: u16, starting_address: u16) -> bool {
        self.unit_ids.contains(&unit_id)
            && self.function_codes.contains(&function_code)
            && self.addresses.contains(&address)
            && self
                .fixed_starting_address
                .map_or(true, |fixed| fixed == starting_address)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("unit_ids", &self.unit_ids)
            .field("function_codes", &self.function_codes)
            .field("addresses", &self.addresses)
            .field("fixed_starting_address", &self.fixed_starting_address)
            .finish_non_exhaustive()
    }
}

/// Ordered list of rules.
#[derive(Debug, Clone, Default)]
pub struct RouteMap {
    rules: Vec<Rule>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Earlier rules take priority.
    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// First rule matching the request, `None` if nothing matches.
    pub fn match_route(
        &self,
        unit_id: u8,
        function_code: u8,
        address: u16,
        starting_address: u16,
    ) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(unit_id, function_code, address, starting_address))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(
        value: i32,
    ) -> impl Fn(&HandlerRequest) -> Result<i32, HandlerError> + Send + Sync + 'static {
        move |_| Ok(value)
    }

    fn call(rule: &Rule) -> i32 {
        let request = HandlerRequest {
            unit_id: 1,
            function_code: 1,
            address: 1,
            value: None,
        };
        rule.handler().handle(&request).unwrap()
    }

    #[test]
    fn test_basic_rule() {
        let rule = Rule::new(constant(0))
            .unit_ids([1])
            .function_codes([1])
            .addresses([1]);
        assert!(rule.matches(1, 1, 1, 0));
        assert!(!rule.matches(0, 1, 1, 0));
        assert!(!rule.matches(1, 0, 1, 0));
        assert!(!rule.matches(1, 1, 0, 0));
    }

    #[test]
    fn test_wildcards() {
        let rule = Rule::new(constant(0)).function_codes([1]).addresses([1]);
        assert!(rule.matches(1, 1, 1, 0));
        assert!(rule.matches(247, 1, 1, 0));

        let rule = Rule::new(constant(0)).unit_ids([1]).addresses([1]);
        assert!(rule.matches(1, 16, 1, 0));

        let rule = Rule::new(constant(0)).unit_ids([1]).function_codes([1]);
        assert!(rule.matches(1, 1, 65535, 0));
    }

    #[test]
    fn test_fixed_starting_address() {
        let rule = Rule::new(constant(0)).fixed_starting_address(10);
        assert!(rule.matches(1, 3, 12, 10));
        assert!(!rule.matches(1, 3, 12, 11));
    }

    #[test]
    fn test_first_match_wins() {
        let mut routes = RouteMap::new();
        routes
            .add_rule(Rule::new(constant(7)).addresses([5]))
            .add_rule(Rule::new(constant(1)));

        assert_eq!(routes.len(), 2);
        assert_eq!(call(routes.match_route(1, 1, 5, 5).unwrap()), 7);
        assert_eq!(call(routes.match_route(1, 1, 6, 6).unwrap()), 1);
    }

    #[test]
    fn test_no_match() {
        let mut routes = RouteMap::new();
        assert!(routes.is_empty());
        assert!(routes.match_route(1, 1, 1, 1).is_none());

        routes.add_rule(Rule::new(constant(0)).unit_ids([2]));
        assert!(routes.match_route(1, 1, 1, 1).is_none());
    }

    #[test]
    fn test_shared_handler() {
        let handler: Arc<dyn Handler> = Arc::new(constant(3));
        let mut routes = RouteMap::new();
        routes
            .add_rule(Rule::from_arc(handler.clone()).unit_ids([1]))
            .add_rule(Rule::from_arc(handler).unit_ids([2]));
        assert_eq!(call(routes.match_route(2, 1, 0, 0).unwrap()), 3);
    }
}
