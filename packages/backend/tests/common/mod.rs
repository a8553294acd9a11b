#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use mace_backend::{InMemoryStore, MaceConfig, MaceManager, SchemaDef};

pub const RELIABLE: [&str; 2] = ["alice", "bob"];
pub const SPAMMER: &str = "spam";

/// item -> true sentiment
pub const GOLD: [(&str, &str); 4] = [
    ("item_1", "positive"),
    ("item_2", "negative"),
    ("item_3", "positive"),
    ("item_4", "negative"),
];

pub fn test_config(output_dir: &Path) -> MaceConfig {
    MaceConfig {
        enabled: true,
        trigger_every_n: 10,
        min_annotations_per_item: 3,
        min_items: 4,
        output_dir: output_dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn sentiment_schema() -> SchemaDef {
    SchemaDef::new("sentiment", "radio", &["negative", "positive"])
}

pub fn topics_schema() -> SchemaDef {
    SchemaDef::new("topics", "multiselect", &["news", "sports", "tech"])
}

/// Two annotators who always match `GOLD` and one who always says "positive"
pub fn spammer_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (item, label) in GOLD {
        for user in RELIABLE {
            store.set(user, item, "sentiment", label, true);
        }
        store.set(SPAMMER, item, "sentiment", "positive", true);
    }
    store
}

/// Multiselect votes: item -> options every reliable annotator ticks
pub fn add_topic_votes(store: &InMemoryStore) {
    let picks: [(&str, &[&str]); 4] = [
        ("item_1", &["news"]),
        ("item_2", &["sports", "tech"]),
        ("item_3", &["tech"]),
        ("item_4", &["news", "sports"]),
    ];
    for (item, options) in picks {
        for user in RELIABLE {
            for option in ["news", "sports", "tech"] {
                store.set(user, item, "topics", option, options.contains(&option));
            }
        }
        store.set(SPAMMER, item, "topics", "news", true);
    }
}

pub fn manager(
    output_dir: &Path,
    schemas: Vec<SchemaDef>,
    store: Arc<InMemoryStore>,
) -> MaceManager {
    MaceManager::new(test_config(output_dir), schemas, store)
}
