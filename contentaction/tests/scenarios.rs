//! End-to-end behavior through the `ContentActions` facade with in-memory
//! collaborators.

use std::collections::HashSet;
use std::sync::Arc;

use contentaction::model::{DescriptorBatch, DescriptorEntry, HighlightDef};
use contentaction::sources::registry_file;
use contentaction::testing::{
    RecordingSpawner, RecordingTransport, StaticConditions, StaticDiscovery, StaticSniffer,
};
use contentaction::{ActionError, ContentActions, Target};
use defaults_store::{DefaultsStore, FileDefaults, MemoryDefaults, PersistenceConfig};
use tempfile::TempDir;

struct Harness {
    actions: ContentActions,
    transport: Arc<RecordingTransport>,
    spawner: Arc<RecordingSpawner>,
    defaults: Arc<MemoryDefaults>,
}

fn harness(registry: &str) -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let spawner = Arc::new(RecordingSpawner::default());
    let defaults = Arc::new(MemoryDefaults::new());

    let actions = ContentActions::builder()
        .sniffer(Arc::new(StaticSniffer::with([
            ("file:///photos/a.jpg", "image/jpeg"),
            ("file:///photos/b.png", "image/png"),
            ("file:///docs/c.txt", "text/plain"),
        ])))
        .evaluator(Arc::new(StaticConditions::with([
            ("image", "urn:uuid:img-1"),
            ("contact", "urn:uuid:person-1"),
        ])))
        .defaults(defaults.clone())
        .transport(transport.clone())
        .spawner(spawner.clone())
        .discovery(Arc::new(StaticDiscovery::with([(
            "com.example.ImageIf",
            "com.example.viewer",
        )])))
        .build();

    let report = actions.load(registry_file::parse_str(registry).unwrap());
    assert!(report.is_clean(), "rejected: {:?}", report.rejected);

    Harness {
        actions,
        transport,
        spawner,
        defaults,
    }
}

fn ids(actions: &[Arc<contentaction::ActionDescriptor>]) -> Vec<String> {
    actions.iter().map(|a| a.id.clone()).collect()
}

const REGISTRY: &str = r#"
[[action]]
id = "gallery"
name = "Gallery"
keys = ["image/*"]
service = "org.x.gallery"

[[action]]
id = "viewer"
keys = ["image/jpeg", "x-condition/image"]
method = "com.example.ImageIf.showImage"

[[action]]
id = "mailer"
keys = ["x-scheme/mailto"]
exec = "/usr/bin/mail %U"

[[action]]
id = "dialer"
keys = ["x-highlight/phone"]
service = "org.x.dialer"

[[action]]
id = "addressbook"
keys = ["x-maemo-nepomuk/contact", "x-scheme/urn"]
legacy_service = "com.example.addressbook"

[[condition]]
name = "image"
sparql = "{ ?uri a nfo:Image . }"

[[condition]]
name = "contact"
sparql = "{ ?uri a nco:Contact . }"

[[highlight]]
name = "phone"
regexp = '\+?\d+'
"#;

#[tokio::test]
async fn test_gallery_scenario_app_launch() {
    let h = harness(
        r#"
[[action]]
id = "gallery"
keys = ["image/*"]
service = "org.x.gallery"
"#,
    );
    let target = Target::content("file:///photos/a.jpg");

    let resolved = h.actions.resolve(&target).await;
    assert_eq!(ids(&resolved), vec!["gallery"]);

    h.actions.trigger_on(&resolved[0], &[target]).await.unwrap();

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].service, "org.x.gallery");
    assert_eq!(calls[0].method, "launch");
    assert_eq!(calls[0].args, vec!["file:///photos/a.jpg".to_string()]);
}

#[tokio::test]
async fn test_mailer_scenario_exec() {
    let h = harness(REGISTRY);
    let target = Target::from_arg("mailto:a@b.com");

    assert_eq!(h.actions.classes_of(&target).await, vec!["x-scheme/mailto"]);

    let resolved = h.actions.resolve(&target).await;
    assert_eq!(ids(&resolved), vec!["mailer"]);

    h.actions.trigger_on(&resolved[0], &[target]).await.unwrap();
    assert_eq!(
        h.spawner.spawned(),
        vec![vec!["/usr/bin/mail".to_string(), "mailto:a@b.com".to_string()]]
    );
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_highlight_scenario() {
    let h = harness(REGISTRY);

    let matches: Vec<_> = h.actions.highlight("call 123 now").collect();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].start, 5);
    assert_eq!(matches[0].length, 3);
    assert_eq!(matches[0].text, "123");
    assert_eq!(ids(&matches[0].actions), vec!["dialer"]);

    // Same actions as resolving the fragment directly.
    let fragment = Target::fragment("123", "phone");
    assert_eq!(ids(&h.actions.resolve(&fragment).await), vec!["dialer"]);

    h.actions
        .trigger(&matches[0].actions[0], &[matches[0].text.clone()])
        .await
        .unwrap();
    assert_eq!(h.transport.calls()[0].args, vec!["123".to_string()]);
}

#[tokio::test]
async fn test_set_default_unknown_action_scenario() {
    let h = harness(REGISTRY);

    let err = h
        .actions
        .set_default("image/*", "nonexistent")
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::UnknownAction(_)));
    assert!(h.defaults.entries().await.unwrap().is_empty());
    assert_eq!(h.actions.default_for_key("image/*").await.unwrap(), None);
}

#[tokio::test]
async fn test_lookup_exactness() {
    let h = harness(REGISTRY);
    let snapshot = h.actions.store().snapshot();

    for action in snapshot.descriptors() {
        for key in &action.keys {
            assert!(snapshot.lookup(key).iter().any(|a| a.id == action.id));
        }
    }

    for key in ["image/*", "image/jpeg", "x-condition/image", "x-scheme/urn"] {
        for action in snapshot.lookup(key) {
            assert!(action.declares(key));
        }
    }
}

#[tokio::test]
async fn test_object_target_conditions_and_scheme() {
    let h = harness(REGISTRY);
    let image = Target::object("urn:uuid:img-1");

    assert_eq!(
        h.actions.classes_of(&image).await,
        vec!["x-condition/image", "x-scheme/urn"]
    );
    assert_eq!(
        ids(&h.actions.resolve(&image).await),
        vec!["viewer", "addressbook"]
    );

    let contact = Target::object("urn:uuid:person-1");
    let resolved = h.actions.resolve(&contact).await;
    assert_eq!(ids(&resolved), vec!["addressbook"]);

    h.actions.trigger_on(&resolved[0], &[contact]).await.unwrap();
    let call = &h.transport.calls()[0];
    assert_eq!(call.service, "com.example.addressbook");
    assert_eq!(call.object_path, "/com/example/addressbook");
    assert_eq!(call.method, "mime_open");
}

#[tokio::test]
async fn test_resolution_has_no_duplicates_and_keeps_first_seen_order() {
    let h = harness(REGISTRY);

    let resolved = h.actions.resolve(&Target::content("file:///photos/a.jpg")).await;
    assert_eq!(ids(&resolved), vec!["viewer", "gallery"]);

    let unique: HashSet<String> = ids(&resolved).into_iter().collect();
    assert_eq!(unique.len(), resolved.len());

    // The addressbook declares both the contact condition and the urn scheme.
    let contact = h.actions.resolve(&Target::object("urn:uuid:person-1")).await;
    let unique: HashSet<String> = ids(&contact).into_iter().collect();
    assert_eq!(unique.len(), contact.len());
    assert_eq!(ids(&contact), vec!["addressbook"]);
}

#[tokio::test]
async fn test_default_round_trip_and_specificity() {
    let h = harness(REGISTRY);
    let jpeg = Target::content("file:///photos/a.jpg");
    let png = Target::content("file:///photos/b.png");

    assert!(h.actions.default_action(&jpeg).await.unwrap().is_none());

    h.actions.set_default("image/*", "gallery").await.unwrap();
    assert_eq!(h.actions.default_action(&png).await.unwrap().unwrap().id, "gallery");
    assert_eq!(h.actions.default_action(&jpeg).await.unwrap().unwrap().id, "gallery");

    h.actions.set_default("image/jpeg", "viewer").await.unwrap();
    assert_eq!(h.actions.default_action(&jpeg).await.unwrap().unwrap().id, "viewer");
    assert_eq!(h.actions.default_action(&png).await.unwrap().unwrap().id, "gallery");

    // Gallery applies to both, the jpeg-only default does not.
    let both = [jpeg.clone(), png.clone()];
    assert!(h.actions.default_action_all(&both).await.unwrap().is_none());
    assert_eq!(ids(&h.actions.resolve_all(&both).await), vec!["gallery"]);
}

#[tokio::test]
async fn test_stale_default_after_reload() {
    let h = harness(REGISTRY);
    let jpeg = Target::content("file:///photos/a.jpg");

    h.actions.set_default("image/jpeg", "viewer").await.unwrap();
    h.actions.set_default("image/*", "gallery").await.unwrap();

    // Reload without the viewer: its record goes stale and is skipped.
    let batch = DescriptorBatch {
        actions: vec![DescriptorEntry {
            id: "gallery".into(),
            keys: vec!["image/*".into()],
            service: Some("org.x.gallery".into()),
            ..Default::default()
        }],
        highlights: vec![HighlightDef {
            name: "phone".into(),
            regexp: r"\d+".into(),
        }],
        ..Default::default()
    };
    h.actions.load(batch);

    assert_eq!(h.actions.default_action(&jpeg).await.unwrap().unwrap().id, "gallery");
    assert_eq!(
        h.actions.default_for_key("image/jpeg").await.unwrap().as_deref(),
        Some("viewer")
    );

    // Highlight actions follow the new snapshot.
    let m = h.actions.highlight("555").next().unwrap();
    assert!(m.actions.is_empty());
}

#[tokio::test]
async fn test_highlight_is_deterministic_and_non_overlapping() {
    let h = harness(
        r#"
[[highlight]]
name = "email"
regexp = '[\w.]+@[\w.]+'

[[highlight]]
name = "phone"
regexp = '\+?\d+'

[[highlight]]
name = "word"
regexp = '[a-z]+'
"#,
    );
    let text = "mail joe42@example.com or +358 1234 today";

    let first: Vec<(usize, usize, String)> = h
        .actions
        .highlight(text)
        .map(|m| (m.start, m.length, m.pattern))
        .collect();
    let second: Vec<(usize, usize, String)> = h
        .actions
        .highlight(text)
        .map(|m| (m.start, m.length, m.pattern))
        .collect();
    assert_eq!(first, second);

    let mut end = 0;
    for (start, length, _) in &first {
        assert!(*start >= end);
        end = start + length;
        assert!(end <= text.len());
    }
    assert!(first.contains(&(5, 17, "email".to_string())));
    assert!(first.contains(&(26, 4, "phone".to_string())));
}

#[tokio::test]
async fn test_defaults_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("defaults.mpk");

    {
        let defaults = FileDefaults::open(path.clone(), PersistenceConfig::default())
            .await
            .unwrap();
        let actions = ContentActions::builder()
            .defaults(Arc::new(defaults))
            .build();
        actions.load(registry_file::parse_str(REGISTRY).unwrap());
        actions.set_default("x-scheme/mailto", "mailer").await.unwrap();
    }

    let defaults = FileDefaults::open(path, PersistenceConfig::default())
        .await
        .unwrap();
    let actions = ContentActions::builder()
        .defaults(Arc::new(defaults))
        .build();
    actions.load(registry_file::parse_str(REGISTRY).unwrap());

    let default = actions
        .default_action(&Target::from_arg("mailto:x@y.org"))
        .await
        .unwrap();
    assert_eq!(default.unwrap().id, "mailer");
}

#[tokio::test]
async fn test_method_call_dispatch_via_discovery() {
    let h = harness(REGISTRY);
    let viewer = h.actions.action("viewer").unwrap();

    h.actions
        .trigger_on(&viewer, &[Target::content("file:///photos/a.jpg")])
        .await
        .unwrap();

    let call = &h.transport.calls()[0];
    assert_eq!(call.service, "com.example.viewer");
    assert_eq!(call.interface, "com.example.ImageIf");
    assert_eq!(call.method, "showImage");
    assert_eq!(call.object_path, "/");
}
