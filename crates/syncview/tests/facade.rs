#![forbid(unsafe_code)]
#![cfg(feature = "widgets")]

use std::cell::Cell;
use std::rc::Rc;

use syncview::prelude::widgets;
use syncview::{DocumentSync, Origin, Patch, PropertyModel, SyncConfig, Value};

#[test]
fn config_flows_into_document_sync() {
    let config = SyncConfig::from_toml_str(
        r#"
        suppress_equal_writes = false

        [logging]
        filter = "syncview=debug"
        "#,
    )
    .unwrap();
    assert!(syncview::logging::env_filter(&config.logging).is_ok());

    let sync = DocumentSync::with_config(config);
    let model = PropertyModel::new("tts", widgets::tts_schema().unwrap());
    sync.register(&model);
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    let _sub = model.subscribe_all(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });

    assert!(sync.apply_patch(&Patch::new("tts", "cancels", 1i64)).unwrap());
    assert!(sync.apply_patch(&Patch::new("tts", "cancels", 1i64)).unwrap());
    assert_eq!(hits.get(), 2);
    assert_eq!(model.get("cancels").unwrap(), Value::Int(1));
    assert!(model.set("speaking", true, Origin::LocalUi).unwrap());
}
