//! End-to-end runs: shared folder → router → instances → simulated store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use mail2item::config::Config;
use mail2item::mail::{EmlDirectoryFolder, IncomingMessage, MailFolder, MemoryFolder};
use mail2item::pipeline::{Instance, Runner, RunnerSettings};
use mail2item::routing::MessageRouter;
use mail2item::workitems::{SimulatedWorkItemStore, WorkItemStore};

const CONFIG: &str = r####"{
    "instances": [
        {
            "name": "web",
            "email": {
                "recipients": ["web-bugs@contoso.com"],
                "append_only_title_regex": "\\[item (?P<id>\\d+)\\]",
                "explicit_overrides_regex": "###\\s*(?P<field>[^:\\n]*):\\s*(?P<value>[^\\n]*)",
                "conversation_key_mode": "full-index"
            },
            "work_items": {
                "conversation_index_field": "ConversationID",
                "default_field_values": [
                    { "field": "Area", "value": "Web" },
                    { "field": "Repro Steps", "value": "##MessageBody" }
                ],
                "mnemonics": [
                    { "mnemonic": "login", "field": "Area", "value": "Web\\Login" }
                ],
                "recipient_overrides": [
                    { "alias": "web-triage@contoso.com", "field": "Priority", "value": "1" }
                ],
                "override_changed_by": true,
                "apply_overrides_during_update": true
            }
        },
        {
            "name": "catch-all",
            "email": {
                "explicit_overrides_regex": "###\\s*(?P<field>[^:\\n]*):\\s*(?P<value>[^\\n]*)"
            },
            "work_items": { "conversation_index_field": "ConversationID" }
        }
    ]
}"####;

fn settings() -> RunnerSettings {
    RunnerSettings {
        iterations: 1,
        interval: Duration::from_millis(1),
        use_threads: true,
        timeout_per_iteration: Duration::from_secs(10),
        watch_path: None,
    }
}

fn build(
    folder: Arc<dyn MailFolder>,
) -> (Runner, Vec<Arc<SimulatedWorkItemStore>>) {
    let config = Config::from_json(CONFIG).unwrap();
    let router = Arc::new(MessageRouter::new(folder));
    let mut stores = Vec::new();
    let mut instances = Vec::new();
    for instance_config in config.instances {
        let store = Arc::new(SimulatedWorkItemStore::new("ConversationID"));
        instances.push(Instance::new(instance_config, router.clone(), store.clone()).unwrap());
        stores.push(store);
    }
    (Runner::new(router, instances, settings()), stores)
}

fn message(id: &str, minute: u32) -> IncomingMessage {
    IncomingMessage {
        id: id.into(),
        received_at: Utc.with_ymd_and_hms(2026, 6, 1, 9, minute, 0).unwrap(),
        sender_name: "Alice".into(),
        sender_address: "alice@contoso.com".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn thread_is_tracked_across_iterations() {
    let folder = Arc::new(MemoryFolder::new());
    let (runner, stores) = build(folder.clone());
    let web = &stores[0];
    let catch_all = &stores[1];

    // First scan: a new web bug (cc'd to triage) and an unrelated message.
    folder.add(IncomingMessage {
        subject: "Login button does nothing".into(),
        plain_text_body: "Clicking it is a no-op. @@@login".into(),
        conversation_index: "01AA".into(),
        to_addresses: vec!["web-bugs@contoso.com".into()],
        cc_addresses: vec!["web-triage@contoso.com".into()],
        ..message("m1", 0)
    });
    folder.add(IncomingMessage {
        subject: "Lunch?".into(),
        conversation_index: "02BB".into(),
        to_addresses: vec!["everyone@contoso.com".into()],
        ..message("m2", 1)
    });

    let report = runner.run_iteration().await.unwrap();
    assert_eq!(report.cycle.fetched, 2);
    assert_eq!(report.inbox.created, 2);
    assert!(folder.is_empty());

    let bug_id = web.conversations().await.unwrap()[0].1;
    let bug = web.get(bug_id).await.unwrap();
    assert_eq!(bug.fields["Title"], "Login button does nothing");
    assert_eq!(bug.fields["Area"], "Web\\Login");
    assert_eq!(bug.fields["Priority"], "1");
    assert_eq!(bug.fields["Repro Steps"], "Clicking it is a no-op. @@@login");
    assert_eq!(catch_all.len().await, 1);

    // Second scan: a reply extending the conversation index, and an
    // append-only message naming the bug explicitly.
    folder.add(IncomingMessage {
        subject: "RE: Login button does nothing".into(),
        plain_text_body: "### Assigned To: Bob\n\nOn Mon, Alice wrote:\n> Clicking it".into(),
        conversation_index: "01AA0001".into(),
        to_addresses: vec!["web-bugs@contoso.com".into()],
        sender_name: "Carol".into(),
        ..message("m3", 5)
    });
    folder.add(IncomingMessage {
        subject: format!("Logs for [item {bug_id}]"),
        plain_text_body: "attached below".into(),
        conversation_index: "03CC".into(),
        to_addresses: vec!["web-bugs@contoso.com".into()],
        ..message("m4", 6)
    });

    let report = runner.run_iteration().await.unwrap();
    assert_eq!(report.inbox.updated, 2);
    assert_eq!(report.inbox.created, 0);
    assert_eq!(web.len().await, 1);

    let bug = web.get(bug_id).await.unwrap();
    assert_eq!(bug.fields["Assigned To"], "Bob");
    assert_eq!(bug.fields["Changed By"], "Alice");
    assert_eq!(bug.comments, vec!["### Assigned To: Bob", "attached below"]);
}

#[tokio::test]
async fn eml_directory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("1-new.eml"),
        "From: Alice <alice@contoso.com>\r\n\
To: web-bugs@contoso.com\r\n\
Subject: Search is slow\r\n\
Date: Mon, 1 Jun 2026 09:00:00 +0000\r\n\
Message-ID: <root-7@contoso.com>\r\n\
\r\n\
Takes 30 seconds.\r\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("2-reply.eml"),
        "From: Bob <bob@contoso.com>\r\n\
To: web-bugs@contoso.com\r\n\
Subject: RE: Search is slow\r\n\
Date: Mon, 1 Jun 2026 10:00:00 +0000\r\n\
Message-ID: <reply-7@contoso.com>\r\n\
References: <root-7@contoso.com>\r\n\
\r\n\
Same here.\r\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not mail").unwrap();

    let folder = EmlDirectoryFolder::open(dir.path()).unwrap();
    let (runner, stores) = build(Arc::new(folder));
    let report = runner.run_iteration().await.unwrap();

    assert_eq!(report.cycle.fetched, 2);
    assert_eq!(report.inbox.created, 1);
    assert_eq!(report.inbox.updated, 1);

    let (key, id) = stores[0].conversations().await.unwrap().remove(0);
    assert_eq!(key, "root-7@contoso.com");
    let item = stores[0].get(id).await.unwrap();
    assert_eq!(item.comments.len(), 1);
    assert!(item.comments[0].contains("Same here."));

    let completed = dir.path().join("completed");
    assert!(completed.join("1-new.eml").is_file());
    assert!(completed.join("2-reply.eml").is_file());
    assert!(dir.path().join("notes.txt").is_file());
}
