#![forbid(unsafe_code)]

//! Browser location bridge.
//!
//! On render and on every `popstate` the browser location is read into the
//! model. A server write to `pathname`, `search` or `hash` recomposes the
//! href and navigates: a full navigation when `refresh` is set, a silent
//! history push otherwise. Afterwards every field is re-read, so the model
//! reflects what the browser actually shows.
//!
//! # Invariants
//!
//! 1. Only server-originated changes navigate; the bridge's own re-reads
//!    never do.
//! 2. `search` is empty or starts with `?`; `hash` is empty or starts with
//!    `#` (enforced by field patterns).

use std::rc::Rc;

use syncview_core::{Change, FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, Value};
use syncview_runtime::{
    ListenerTable, ReentrancyGuard, RenderContext, RenderOutcome, UpdateAction, View,
};
use tracing::{debug, warn};

use crate::capability::{CapabilityProvider, History, LocationSnapshot};

/// Schema of a location model.
///
/// # Errors
///
/// Never in practice; the patterns are static.
pub fn location_schema() -> Result<Schema> {
    let output = |name: &str| FieldSpec::new(name, FieldType::Str, "").client_writable();
    let input = |name: &str| FieldSpec::new(name, FieldType::Str, "").bidirectional();
    Schema::define([
        output("href"),
        output("hostname"),
        input("pathname"),
        output("protocol"),
        output("port"),
        input("search").pattern(r"^$|^\?")?,
        input("hash").pattern(r"^$|^#")?,
        FieldSpec::new("refresh", FieldType::Bool, false),
    ])
}

/// Compose an href from its parts.
#[must_use]
pub fn compose_href(location: &LocationSnapshot) -> String {
    let port = if location.port.is_empty() {
        String::new()
    } else {
        format!(":{}", location.port)
    };
    format!(
        "{}//{}{}{}{}{}",
        location.protocol,
        location.hostname,
        port,
        location.pathname,
        location.search,
        location.hash
    )
}

fn model_location(model: &PropertyModel) -> Result<LocationSnapshot> {
    let text = |field: &str| -> Result<String> {
        Ok(model.get(field)?.as_str().unwrap_or_default().to_owned())
    };
    Ok(LocationSnapshot {
        href: text("href")?,
        hostname: text("hostname")?,
        pathname: text("pathname")?,
        protocol: text("protocol")?,
        port: text("port")?,
        search: text("search")?,
        hash: text("hash")?,
    })
}

/// Mirror the browser location into the model.
fn read_location(history: &dyn History, model: &PropertyModel, guard: &ReentrancyGuard) {
    let location = history.location();
    let entries = [
        ("href", location.href),
        ("hostname", location.hostname),
        ("pathname", location.pathname),
        ("protocol", location.protocol),
        ("port", location.port),
        ("search", location.search),
        ("hash", location.hash),
    ]
    .map(|(field, value)| (field, Value::from(value)));
    let ran = guard.run(|| {
        if let Err(err) = model.update(entries, Origin::LocalUi) {
            warn!(model = %model.id(), error = %err, "location read failed");
        }
    });
    if ran.is_none() {
        debug!(model = %model.id(), "nested location read skipped");
    }
}

/// View bridging the browser location and history.
pub struct LocationView {
    caps: CapabilityProvider,
    guard: ReentrancyGuard,
    history: Option<Rc<dyn History>>,
}

impl LocationView {
    #[must_use]
    pub fn new(caps: CapabilityProvider) -> Self {
        Self {
            caps,
            guard: ReentrancyGuard::new(),
            history: None,
        }
    }
}

impl View for LocationView {
    fn name(&self) -> &'static str {
        "location"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        self.history = None;
        let history = self.caps.history()?;
        read_location(history.as_ref(), cx.model(), &self.guard);

        let model = cx.model().clone();
        let guard = self.guard.clone();
        let reader = Rc::clone(&history);
        let mut table = ListenerTable::new();
        table.on(&history.events(), "popstate", move |_| {
            read_location(reader.as_ref(), &model, &guard);
        });
        cx.scope().listen(table);
        self.history = Some(history);
        Ok(RenderOutcome::Ready)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        if !matches!(change.field.as_str(), "pathname" | "search" | "hash") {
            return Ok(UpdateAction::Ignored);
        }
        if change.origin == Origin::LocalUi || self.guard.is_active() {
            return Ok(UpdateAction::Ignored);
        }
        let Some(history) = &self.history else {
            return Ok(UpdateAction::Ignored);
        };
        let href = compose_href(&model_location(cx.model())?);
        let refresh = cx.model().get("refresh")?.as_bool().unwrap_or(false);
        if refresh {
            debug!(%href, "navigating");
            history.assign(&href);
        } else {
            debug!(%href, "pushing history entry");
            history.push_state(&href);
        }
        read_location(history.as_ref(), cx.model(), &self.guard);
        Ok(UpdateAction::Patched)
    }

    fn dispose(&mut self) {
        self.history = None;
    }
}
