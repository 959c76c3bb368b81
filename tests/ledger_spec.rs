use std::sync::{Arc, Barrier};
use std::thread;

use gridwrinkl::db::Database;
use gridwrinkl::ledger::LedgerStore;
use gridwrinkl::models::*;
use gridwrinkl::registry::ZoneRegistry;
use gridwrinkl::Error;
use speculate2::speculate;

fn dana() -> Author {
    Author::human("dana")
}

fn collect(store: &LedgerStore, status: Option<FeatureStatus>) -> Vec<Feature> {
    store
        .list_features(status)
        .iter()
        .collect::<Result<Vec<_>, _>>()
        .expect("Listing failed")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let store = LedgerStore::new(db.clone());
    }

    describe "create_feature" {
        it "creates a proposed feature with an empty ledger" {
            let feature = store.create_feature("login", "user auth").expect("Failed to create");

            assert_eq!(feature.id, "login");
            assert_eq!(feature.description, "user auth");
            assert_eq!(feature.status, FeatureStatus::Proposed);
            assert!(feature.entries.is_empty());
        }

        it "rejects a second feature with the same id" {
            store.create_feature("login", "user auth").expect("Failed to create");

            let result = store.create_feature("login", "again");
            assert!(matches!(result, Err(Error::DuplicateFeature(ref id)) if id == "login"));
        }

        it "rejects identifiers that are not slugs" {
            let result = store.create_feature("User Login", "user auth");
            assert!(matches!(result, Err(Error::InvalidFeatureId(_))));
        }

        it "persists the feature" {
            store.create_feature("login", "user auth").expect("Failed to create");

            let found = store.get_feature("login").expect("Query failed").expect("Missing");
            assert_eq!(found.status, FeatureStatus::Proposed);
            assert_eq!(found.description, "user auth");
        }
    }

    describe "append_entry" {
        it "fails for an unknown feature" {
            let result = store.append_entry("missing", NewLedgerEntry::note(dana(), "hello"));
            assert!(matches!(result, Err(Error::UnknownFeature(ref id)) if id == "missing"));
        }

        it "numbers entries in append order" {
            store.create_feature("login", "user auth").expect("Failed to create");

            let first = store.append_entry("login", NewLedgerEntry::note(dana(), "first")).unwrap();
            let second = store
                .append_entry("login", NewLedgerEntry {
                    author: Author::assistant("claude"),
                    note: "second".to_string(),
                    pattern_ref: Some("patterns.md#errors".to_string()),
                    architecture_ref: Some("architecture.md#store".to_string()),
                })
                .unwrap();

            assert_eq!(first.sequence, 1);
            assert_eq!(second.sequence, 2);

            let feature = store.get_feature("login").unwrap().unwrap();
            let notes: Vec<_> = feature.entries.iter().map(|e| e.note.as_str()).collect();
            assert_eq!(notes, vec!["first", "second"]);
            assert_eq!(feature.entries[1].author.kind, AuthorKind::Assistant);
            assert_eq!(feature.entries[1].pattern_ref.as_deref(), Some("patterns.md#errors"));
            assert_eq!(feature.entries[1].architecture_ref.as_deref(), Some("architecture.md#store"));
        }

        it "keeps ledgers of different features separate" {
            store.create_feature("login", "user auth").unwrap();
            store.create_feature("search", "full text").unwrap();

            store.append_entry("login", NewLedgerEntry::note(dana(), "a")).unwrap();
            let other = store.append_entry("search", NewLedgerEntry::note(dana(), "b")).unwrap();

            assert_eq!(other.sequence, 1);
            assert_eq!(store.get_feature("login").unwrap().unwrap().entries.len(), 1);
        }
    }

    describe "transition" {
        it "moves to the next status and records an entry" {
            store.create_feature("login", "user auth").unwrap();

            let feature = store
                .transition("login", FeatureStatus::InProgress, &dana())
                .expect("Transition failed");

            assert_eq!(feature.status, FeatureStatus::InProgress);
            assert_eq!(feature.entries.len(), 1);
            assert_eq!(
                feature.entries[0].transition,
                Some(StatusChange { from: FeatureStatus::Proposed, to: FeatureStatus::InProgress })
            );
            assert_eq!(feature.entries[0].author, dana());
        }

        it "refuses to skip in_progress" {
            store.create_feature("login", "user auth").unwrap();

            let result = store.transition("login", FeatureStatus::Complete, &dana());
            assert!(matches!(
                result,
                Err(Error::InvalidTransition { from: FeatureStatus::Proposed, to: FeatureStatus::Complete, .. })
            ));

            let feature = store.get_feature("login").unwrap().unwrap();
            assert_eq!(feature.status, FeatureStatus::Proposed);
            assert!(feature.entries.is_empty());
        }

        it "refuses to move backwards or stay put" {
            store.create_feature("login", "user auth").unwrap();
            store.transition("login", FeatureStatus::InProgress, &dana()).unwrap();
            store.transition("login", FeatureStatus::Complete, &dana()).unwrap();

            for status in [FeatureStatus::Proposed, FeatureStatus::InProgress, FeatureStatus::Complete] {
                let result = store.transition("login", status, &dana());
                assert!(matches!(result, Err(Error::InvalidTransition { .. })), "{}", status);
            }
        }

        it "walks the full lifecycle" {
            store.create_feature("login", "user auth").unwrap();
            for status in [FeatureStatus::InProgress, FeatureStatus::Complete, FeatureStatus::Archived] {
                store.transition("login", status, &dana()).unwrap();
            }

            let feature = store.get_feature("login").unwrap().unwrap();
            assert_eq!(feature.status, FeatureStatus::Archived);
            assert_eq!(feature.entries.len(), 3);

            let result = store.transition("login", FeatureStatus::Archived, &dana());
            assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        }

        it "fails for an unknown feature" {
            let result = store.transition("missing", FeatureStatus::InProgress, &dana());
            assert!(matches!(result, Err(Error::UnknownFeature(_))));
        }
    }

    describe "list_features" {
        it "lists features in creation order with their entries" {
            store.create_feature("zeta", "last letter").unwrap();
            store.create_feature("alpha", "first letter").unwrap();
            store.append_entry("alpha", NewLedgerEntry::note(dana(), "note")).unwrap();

            let features = collect(&store, None);
            let ids: Vec<_> = features.iter().map(|f| f.id.as_str()).collect();
            assert_eq!(ids, vec!["zeta", "alpha"]);
            assert_eq!(features[1].entries.len(), 1);
        }

        it "filters by status" {
            store.create_feature("login", "user auth").unwrap();
            store.create_feature("search", "full text").unwrap();
            store.transition("search", FeatureStatus::InProgress, &dana()).unwrap();

            let in_progress = collect(&store, Some(FeatureStatus::InProgress));
            assert_eq!(in_progress.len(), 1);
            assert_eq!(in_progress[0].id, "search");

            assert!(collect(&store, Some(FeatureStatus::Archived)).is_empty());
        }

        it "pages lazily and can be restarted" {
            for i in 0..7 {
                store.create_feature(&format!("feature-{}", i), "paged").unwrap();
            }

            let listing = store.list_features(None).with_page_size(3);
            let first: Vec<_> = listing.iter().map(|f| f.unwrap().id).collect();
            let second: Vec<_> = listing.iter().map(|f| f.unwrap().id).collect();

            assert_eq!(first.len(), 7);
            assert_eq!(first, second);
            assert_eq!(first[0], "feature-0");
            assert_eq!(first[6], "feature-6");
        }

        it "sees features created after the listing was made" {
            let listing = store.list_features(None);
            store.create_feature("late", "created after").unwrap();

            assert_eq!(listing.iter().count(), 1);
        }
    }

    describe "recent_entries" {
        it "returns the last entries oldest first" {
            store.create_feature("login", "user auth").unwrap();
            for i in 1..=5 {
                store.append_entry("login", NewLedgerEntry::note(dana(), format!("note {}", i))).unwrap();
            }

            let recent = store.recent_entries("login", 2).unwrap();
            let notes: Vec<_> = recent.iter().map(|e| e.note.as_str()).collect();
            assert_eq!(notes, vec!["note 4", "note 5"]);
        }
    }

    describe "file change entries" {
        it "are part of the ledger sequence and keep their structure" {
            store.create_feature("login", "user auth").unwrap();
            store.append_entry("login", NewLedgerEntry::note(dana(), "planned")).unwrap();
            ZoneRegistry::new(db.clone())
                .with_author(dana())
                .track("src/user_authentication/models.py", Some("login"))
                .unwrap();

            let recent = store.recent_entries("login", 1).unwrap();
            assert_eq!(recent.len(), 1);
            assert_eq!(recent[0].sequence, 2);
            assert_eq!(recent[0].author, dana());
            assert!(recent[0].transition.is_none());
            assert_eq!(
                recent[0].file_change,
                Some(FileChange::Associated {
                    path: "src/user_authentication/models.py".to_string(),
                    zone: Zone::Active,
                })
            );
            assert!(recent[0].note.starts_with("Associated src/user_authentication/models.py"));
        }

        it "are not attached to plain notes" {
            store.create_feature("login", "user auth").unwrap();
            let entry = store.append_entry("login", NewLedgerEntry::note(dana(), "plain")).unwrap();

            assert!(entry.file_change.is_none());
            assert!(store.get_feature("login").unwrap().unwrap().entries[0].file_change.is_none());
        }
    }

    describe "concurrent appends" {
        it "keeps every entry from threads sharing the store" {
            store.create_feature("login", "user auth").unwrap();

            let threads = 8;
            let per_thread = 25;
            let barrier = Arc::new(Barrier::new(threads));

            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        for i in 0..per_thread {
                            store
                                .append_entry("login", NewLedgerEntry::note(dana(), format!("{}-{}", t, i)))
                                .expect("Append failed");
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("Thread panicked");
            }

            let feature = store.get_feature("login").unwrap().unwrap();
            assert_eq!(feature.entries.len(), threads * per_thread);

            let sequences: Vec<i64> = feature.entries.iter().map(|e| e.sequence).collect();
            let expected: Vec<i64> = (1..=(threads * per_thread) as i64).collect();
            assert_eq!(sequences, expected);

            // Each thread's own entries keep their relative order.
            for t in 0..threads {
                let prefix = format!("{}-", t);
                let own: Vec<usize> = feature
                    .entries
                    .iter()
                    .filter(|e| e.note.starts_with(&prefix))
                    .map(|e| e.note[prefix.len()..].parse().unwrap())
                    .collect();
                assert_eq!(own, (0..per_thread).collect::<Vec<_>>());
            }
        }
    }
}

#[test]
fn concurrent_transitions_from_separate_connections_allow_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let setup = Database::open(&path).unwrap();
    setup.migrate().unwrap();
    LedgerStore::new(setup).create_feature("login", "user auth").unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                let store = LedgerStore::new(db);
                barrier.wait();
                store.transition("login", FeatureStatus::InProgress, &dana())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, Error::InvalidTransition { .. })));

    let db = Database::open(&path).unwrap();
    let feature = LedgerStore::new(db).get_feature("login").unwrap().unwrap();
    assert_eq!(feature.entries.len(), 1);
}
