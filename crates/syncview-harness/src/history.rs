#![forbid(unsafe_code)]

//! Browser history fake.

use std::cell::RefCell;
use std::rc::Rc;

use syncview_runtime::EventSource;
use syncview_widgets::{History, LocationSnapshot};

use crate::events::FakeEventSource;

/// Split an absolute href into location parts.
///
/// Handles `protocol//host[:port][/path][?search][#hash]`, which is all the
/// bridges produce.
#[must_use]
pub fn parse_href(href: &str) -> LocationSnapshot {
    let (protocol, rest) = href.split_once("//").unwrap_or(("", href));
    let (rest, hash) = match rest.find('#') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let (rest, search) = match rest.find('?') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let (host, pathname) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (hostname, port) = host.split_once(':').unwrap_or((host, ""));
    LocationSnapshot {
        href: href.to_owned(),
        hostname: hostname.to_owned(),
        pathname: pathname.to_owned(),
        protocol: protocol.to_owned(),
        port: port.to_owned(),
        search: search.to_owned(),
        hash: hash.to_owned(),
    }
}

/// History whose location changes on `assign` / `push_state` and on
/// simulated back navigation.
pub struct FakeHistory {
    location: RefCell<LocationSnapshot>,
    assigned: RefCell<Vec<String>>,
    pushed: RefCell<Vec<String>>,
    events: Rc<FakeEventSource>,
}

impl FakeHistory {
    #[must_use]
    pub fn new(href: &str) -> Self {
        Self {
            location: RefCell::new(parse_href(href)),
            assigned: RefCell::new(Vec::new()),
            pushed: RefCell::new(Vec::new()),
            events: Rc::new(FakeEventSource::new()),
        }
    }

    /// Full navigations, in order.
    #[must_use]
    pub fn assigned(&self) -> Vec<String> {
        self.assigned.borrow().clone()
    }

    /// Silent history pushes, in order.
    #[must_use]
    pub fn pushed(&self) -> Vec<String> {
        self.pushed.borrow().clone()
    }

    /// Simulate back/forward navigation to `href`, firing `popstate`.
    pub fn pop_to(&self, href: &str) {
        *self.location.borrow_mut() = parse_href(href);
        self.events.fire("popstate");
    }

    #[must_use]
    pub fn source(&self) -> &FakeEventSource {
        &self.events
    }
}

impl History for FakeHistory {
    fn location(&self) -> LocationSnapshot {
        self.location.borrow().clone()
    }

    fn assign(&self, href: &str) {
        self.assigned.borrow_mut().push(href.to_owned());
        *self.location.borrow_mut() = parse_href(href);
    }

    fn push_state(&self, href: &str) {
        self.pushed.borrow_mut().push(href.to_owned());
        *self.location.borrow_mut() = parse_href(href);
    }

    fn events(&self) -> Rc<dyn EventSource> {
        self.events.clone()
    }
}
