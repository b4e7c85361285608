//! Object synchronization against the in-memory host.

use proptest::prelude::*;
use stagesync_codec::{ChangeSet, Row, PARAMETERS_TABLE};
use stagesync_core::document::PARAM_SITE_NAME;
use stagesync_core::{
    ChangeTask, GroupRef, MergePolicy, NoopObserver, ObjectStore, ProcessOptions, SourceUser,
    StagingConfig, StagingError, TaskKind, TaskObserver,
};
use stagesync_testkit::prelude::*;
use stagesync_testkit::types::{CATEGORY, ROLE, SITE, TAG, TAG_GROUP, USER, USER_SITE};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

fn seed_group(test: &TestHost, name: &str, guid: Uuid) -> i64 {
    test.seed(
        TAG_GROUP,
        Row::new()
            .with("TagGroupName", name)
            .with("TagGroupDisplayName", "Old")
            .with("TagGroupGUID", guid)
            .with("TagGroupSiteID", test.site_id)
            .with("TagGroupTagCount", 0),
    )
}

fn seed_tag(test: &TestHost, group_id: i64, name: &str) -> i64 {
    test.seed(
        TAG,
        Row::new()
            .with("TagName", name)
            .with("TagGUID", Uuid::new_v4())
            .with("TagGroupID", group_id),
    )
}

fn tag_names(test: &TestHost, group_id: i64) -> BTreeSet<String> {
    test.rows(TAG)
        .iter()
        .filter(|r| r.id("TagGroupID") == Some(group_id))
        .filter_map(|r| r.text("TagName").map(str::to_string))
        .collect()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|n| (*n).to_string()).collect()
}

fn role_row(id: i64, name: &str) -> Row {
    Row::new()
        .with("RoleID", id)
        .with("RoleGUID", Uuid::new_v4())
        .with("RoleName", name)
        .with("RoleDisplayName", format!("{name} role"))
        .with("SiteID", 70)
}

fn role_task(row: Row) -> ChangeTask {
    task(TaskKind::UpdateObject, ROLE, &ChangeSet::new().with_row(ROLE, row))
}

fn user_row(id: i64, name: &str) -> Row {
    Row::new()
        .with("UserID", id)
        .with("UserGUID", Uuid::new_v4())
        .with("UserName", name)
}

fn category_row(id: i64, name: &str, user_id: i64) -> Row {
    Row::new()
        .with("CategoryID", id)
        .with("CategoryGUID", Uuid::new_v4())
        .with("CategoryName", name)
        .with("CategoryUserID", user_id)
}

#[derive(Default)]
struct Recorder {
    deferred: RefCell<Vec<String>>,
    resolved: RefCell<Vec<String>>,
}

impl TaskObserver for Recorder {
    fn on_deferred(&self, object_type: &str, columns: &[String]) {
        self.deferred
            .borrow_mut()
            .push(format!("{object_type}.{}", columns.join(",")));
    }

    fn on_resolved(&self, object_type: &str, _target_id: i64) {
        self.resolved.borrow_mut().push(object_type.to_string());
    }
}

#[test]
fn tag_group_update_keeps_target_identifier() {
    let test = TestHost::new();
    let existing = seed_group(&test, "NewTagGroup", Uuid::new_v4());
    let source = TagGroupSource::new(7, "NewTagGroup").tag("red").tag("blue");

    let outcome = test.service().process_task(&source.task()).unwrap();

    let object = outcome.object.unwrap();
    assert_eq!(object.target_id, existing);
    assert_eq!(object.guid, Some(source.guid));
    assert_eq!(outcome.applied, 3);
    assert_eq!(test.rows(TAG_GROUP).len(), 1);

    let group = test.find(TAG_GROUP, "TagGroupName", "NewTagGroup").unwrap();
    assert_eq!(group.text("TagGroupDisplayName"), Some("NewTagGroup tags"));
    assert_eq!(group.id("TagGroupSiteID"), Some(test.site_id));
    // Recomputed by the post-apply hook.
    assert_eq!(group.integer("TagGroupTagCount"), Some(2));
    assert_eq!(tag_names(&test, existing), names(&["blue", "red"]));
}

#[test]
fn excluded_columns_keep_target_values() {
    let test = TestHost::new();
    let existing = test.seed(
        ROLE,
        Row::new()
            .with("RoleName", "editors")
            .with("RoleDisplayName", "Editors")
            .with("RoleGUID", Uuid::new_v4())
            .with("SiteID", test.site_id)
            .with("RoleNotes", "kept"),
    );
    let service = test.service();

    service
        .process_task(&role_task(role_row(42, "editors").with("RoleNotes", "incoming")))
        .unwrap();
    let role = test.find(ROLE, "RoleName", "editors").unwrap();
    assert_eq!(role.id("RoleID"), Some(existing));
    assert_eq!(role.text("RoleDisplayName"), Some("editors role"));
    assert_eq!(role.text("RoleNotes"), Some("kept"));

    // A new object starts from the declared default.
    service
        .process_task(&role_task(role_row(43, "authors").with("RoleNotes", "incoming")))
        .unwrap();
    let authors = test.find(ROLE, "RoleName", "authors").unwrap();
    assert_eq!(authors.text("RoleNotes"), Some(""));
}

fn group_task(source: &TagGroupSource, display_name: &Option<String>) -> ChangeTask {
    let mut set = source.change_set();
    if let Some(row) = set.ensure_table(TAG_GROUP).rows.first_mut() {
        row.set("TagGroupDisplayName", display_name.clone());
    }
    task(TaskKind::UpdateObject, TAG_GROUP, &set)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn repeated_task_is_idempotent(
        group in code_name_strategy(),
        tags in name_set_strategy(5),
        display_name in display_name_strategy(),
    ) {
        let test = TestHost::new();
        let source = tags
            .iter()
            .fold(TagGroupSource::new(7, &group), |s, name| s.tag(name));
        let service = test.service();

        let first = service.process_task(&group_task(&source, &display_name)).unwrap();
        let groups = test.rows(TAG_GROUP);
        let stored = test.rows(TAG);

        let second = service.process_task(&group_task(&source, &display_name)).unwrap();
        prop_assert_eq!(&first.object, &second.object);
        prop_assert_eq!(test.rows(TAG_GROUP), groups);
        prop_assert_eq!(test.rows(TAG), stored);
        prop_assert_eq!(tag_names(&test, first.object.unwrap().target_id), tags);
    }

    #[test]
    fn complete_merge_converges_to_source(
        (target, source) in target_and_source_strategy(6)
    ) {
        let test = TestHost::new();
        let group = seed_group(&test, "colors", Uuid::new_v4());
        for name in &target {
            seed_tag(&test, group, name);
        }
        let incoming = source
            .iter()
            .fold(TagGroupSource::new(7, "colors"), |s, name| s.tag(name));

        test.service().process_task(&incoming.task()).unwrap();

        prop_assert_eq!(tag_names(&test, group), source.clone());
        let stored = test.find(TAG_GROUP, "TagGroupName", "colors").unwrap();
        prop_assert_eq!(stored.integer("TagGroupTagCount"), Some(source.len() as i64));
    }
}

#[test]
fn merge_override_narrows_reconciliation() {
    let test = TestHost::new();
    let group = seed_group(&test, "colors", Uuid::new_v4());
    seed_tag(&test, group, "old");

    let partial = test.service().with_merge_override(Arc::new(
        |_: TaskKind, _: &str, related: &str, computed: MergePolicy| {
            if related == TAG {
                MergePolicy::Partial
            } else {
                computed
            }
        },
    ));
    partial
        .process_task(&TagGroupSource::new(7, "colors").tag("new").task())
        .unwrap();
    assert_eq!(tag_names(&test, group), names(&["new", "old"]));

    let none = test.service().with_merge_override(Arc::new(
        |_: TaskKind, _: &str, _: &str, _: MergePolicy| MergePolicy::None,
    ));
    none.process_task(&TagGroupSource::new(7, "colors").tag("ignored").task())
        .unwrap();
    assert_eq!(tag_names(&test, group), names(&["new", "old"]));
}

#[test]
fn deferred_reference_resolves_on_post_process() {
    let test = TestHost::new();
    // The child category arrives before its parent.
    let set = ChangeSet::new()
        .with_row(USER, user_row(11, "editor"))
        .with_row(CATEGORY, category_row(31, "drafts", 11).with("CategoryParentID", 30))
        .with_row(CATEGORY, category_row(30, "work", 11));
    let recorder = Recorder::default();

    let outcome = test
        .service()
        .process_task_with(
            &task(TaskKind::UpdateObject, USER, &set),
            ProcessOptions::default(),
            &recorder,
        )
        .unwrap();

    assert_eq!(outcome.deferred_resolved, 1);
    assert_eq!(*recorder.deferred.borrow(), vec![format!("{CATEGORY}.CategoryParentID")]);
    assert_eq!(*recorder.resolved.borrow(), vec![CATEGORY.to_string()]);

    let user = test.find(USER, "UserName", "editor").unwrap();
    let work = test.find(CATEGORY, "CategoryName", "work").unwrap();
    let drafts = test.find(CATEGORY, "CategoryName", "drafts").unwrap();
    assert_eq!(drafts.id("CategoryParentID"), work.id("CategoryID"));
    assert_eq!(drafts.id("CategoryUserID"), user.id("UserID"));
}

#[test]
fn unknown_owner_takes_the_fallback_user() {
    let test = TestHost::new();
    let set = ChangeSet::new().with_row(CATEGORY, category_row(5, "misc", 99));

    test.service()
        .process_task(&task(TaskKind::UpdateObject, CATEGORY, &set))
        .unwrap();

    let misc = test.find(CATEGORY, "CategoryName", "misc").unwrap();
    assert_eq!(misc.id("CategoryUserID"), Some(test.admin_id));
}

#[test]
fn unresolved_reference_fails_naming_the_column() {
    let test = TestHost::new();
    let set = ChangeSet::new()
        .with_row(USER, user_row(11, "editor"))
        .with_row(CATEGORY, category_row(31, "drafts", 11).with("CategoryParentID", 99));

    let err = test
        .service()
        .process_task(&task(TaskKind::UpdateObject, USER, &set))
        .unwrap_err();

    match &err {
        StagingError::Translation {
            object_type,
            columns,
        } => {
            assert_eq!(object_type, CATEGORY);
            assert_eq!(columns, &vec!["CategoryParentID".to_string()]);
        }
        other => panic!("expected a translation error, got {other:?}"),
    }
    assert!(!err.is_retryable());

    // Work done before the failure stays.
    assert!(test.find(USER, "UserName", "editor").is_some());
    assert!(test.find(CATEGORY, "CategoryName", "drafts").is_none());

    let events = test.events.entries();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_code, "UpdateObject");
    assert!(events[0].message.contains("CategoryParentID"));
}

#[test]
fn disabled_post_process_fails_on_first_deferral() {
    let test = TestHost::new();
    let set = ChangeSet::new()
        .with_row(USER, user_row(11, "editor"))
        .with_row(CATEGORY, category_row(31, "drafts", 11).with("CategoryParentID", 30))
        .with_row(CATEGORY, category_row(30, "work", 11));
    let service =
        test.service_with(StagingConfig::new().target_site(MAIN_SITE).process_post_queue(false));

    let err = service
        .process_task(&task(TaskKind::UpdateObject, USER, &set))
        .unwrap_err();
    assert!(matches!(err, StagingError::Translation { .. }));
}

#[test]
fn restore_reuses_original_identifier() {
    let test = TestHost::new();
    let outcome = test
        .service()
        .process_task_with(
            &role_task(role_row(42, "editors")),
            ProcessOptions::default().restore(true),
            &NoopObserver,
        )
        .unwrap();
    assert_eq!(outcome.object.unwrap().target_id, 42);
}

#[test]
fn restore_rejects_identifier_in_use() {
    let test = TestHost::new();
    let roles = test.host.registry.descriptor(ROLE).unwrap();
    test.objects
        .insert(
            &roles,
            &Row::new().with("RoleName", "other").with("SiteID", test.site_id),
            Some(42),
        )
        .unwrap();

    let err = test
        .service()
        .process_task_with(
            &role_task(role_row(42, "editors")),
            ProcessOptions::default().restore(true),
            &NoopObserver,
        )
        .unwrap_err();
    assert!(matches!(err, StagingError::Uniqueness { existing_id: 42, .. }));

    // A live change simply gets a fresh identifier.
    let outcome = test
        .service()
        .process_task(&role_task(role_row(42, "editors")))
        .unwrap();
    assert_ne!(outcome.object.unwrap().target_id, 42);
}

#[test]
fn restore_refuses_unrelated_code_name_match() {
    let test = TestHost::new();
    let guid = Uuid::new_v4();
    let existing = seed_group(&test, "colors", guid);
    let restore = ProcessOptions::default().restore(true);

    let mut source = TagGroupSource::new(7, "colors");
    let err = test
        .service()
        .process_task_with(&source.task(), restore, &NoopObserver)
        .unwrap_err();
    match err {
        StagingError::Uniqueness {
            code_name,
            existing_id,
            ..
        } => {
            assert_eq!(code_name, "colors");
            assert_eq!(existing_id, existing);
        }
        other => panic!("expected a uniqueness error, got {other:?}"),
    }

    source.guid = guid;
    let outcome = test
        .service()
        .process_task_with(&source.task(), restore, &NoopObserver)
        .unwrap();
    assert_eq!(outcome.object.unwrap().target_id, existing);
}

#[test]
fn delete_object_removes_children() {
    let test = TestHost::new();
    let source = TagGroupSource::new(7, "colors").tag("red").tag("blue");
    let service = test.service();
    service.process_task(&source.task()).unwrap();

    let delete = task(TaskKind::DeleteObject, TAG_GROUP, &source.change_set());
    let outcome = service.process_task(&delete).unwrap();
    assert_eq!(outcome.deleted, 3);
    assert!(outcome.object.is_none());
    assert!(test.rows(TAG_GROUP).is_empty());
    assert!(test.rows(TAG).is_empty());
    let last = test.replication.records().pop().unwrap();
    assert_eq!(last.task_kind, TaskKind::DeleteObject);

    // Deleting what is not there is a no-op.
    let outcome = service.process_task(&delete).unwrap();
    assert_eq!(outcome.deleted, 0);
}

#[test]
fn deleting_sites_is_refused() {
    let test = TestHost::new();
    let set = ChangeSet::new().with_row(
        SITE,
        Row::new().with("SiteID", 70).with("SiteName", MAIN_SITE),
    );
    let err = test
        .service()
        .process_task(&task(TaskKind::DeleteObject, SITE, &set))
        .unwrap_err();
    assert!(matches!(err, StagingError::NotSupported { .. }));
    assert_eq!(test.rows(SITE).len(), 1);
}

#[test]
fn add_and_remove_site_binding() {
    let test = TestHost::new();
    let set = ChangeSet::new().with_row(USER, user_row(11, "editor"));
    let service = test.service();

    let outcome = service
        .process_task(&task(TaskKind::AddToSite, USER, &set))
        .unwrap();
    let user_id = outcome.object.unwrap().target_id;
    service
        .process_task(&task(TaskKind::AddToSite, USER, &set))
        .unwrap();

    let bindings = test.rows(USER_SITE);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].id("UserID"), Some(user_id));
    assert_eq!(bindings[0].id("SiteID"), Some(test.site_id));

    let outcome = service
        .process_task(&task(TaskKind::RemoveFromSite, USER, &set))
        .unwrap();
    assert_eq!(outcome.deleted, 1);
    assert!(test.rows(USER_SITE).is_empty());
    assert!(test.find(USER, "UserName", "editor").is_some());
}

#[test]
fn site_binding_preconditions() {
    let test = TestHost::new();
    let service = test.service();

    let groups = TagGroupSource::new(7, "colors").change_set();
    let err = service
        .process_task(&task(TaskKind::AddToSite, TAG_GROUP, &groups))
        .unwrap_err();
    assert!(matches!(err, StagingError::NotSupported { .. }));
    assert!(test.rows(TAG_GROUP).is_empty());

    let set = ChangeSet::new()
        .with_row(USER, user_row(11, "editor"))
        .with_row(PARAMETERS_TABLE, Row::new().with(PARAM_SITE_NAME, "elsewhere"));
    let err = service
        .process_task(&task(TaskKind::AddToSite, USER, &set))
        .unwrap_err();
    assert!(matches!(err, StagingError::DependencyNotFound { .. }));
    assert!(err.is_retryable());
}

#[test]
fn replication_records_carry_task_origin() {
    let test = TestHost::new();
    let source = TagGroupSource::new(7, "colors").tag("red");
    let change = source
        .task()
        .with_source_user(SourceUser {
            guid: Uuid::new_v4(),
            name: "jane".into(),
        })
        .with_group(GroupRef {
            id: 3,
            name: "release".into(),
        });

    let outcome = test.service().process_task(&change).unwrap();
    let group_id = outcome.object.unwrap().target_id;

    // Only the root object is logged.
    let records = test.replication.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_kind, TaskKind::UpdateObject);
    assert_eq!(records[0].object_type, TAG_GROUP);
    assert_eq!(records[0].target_id, group_id);
    assert_eq!(records[0].site_id, Some(test.site_id));
    assert_eq!(records[0].source_user.as_ref().map(|u| u.name.as_str()), Some("jane"));
    assert_eq!(records[0].task_groups[0].name, "release");
    assert!(test
        .cache
        .touched()
        .contains(&format!("{TAG_GROUP}|byid|{group_id}")));

    test.service()
        .process_task_with(&change, ProcessOptions::default().suppress_logging(true), &NoopObserver)
        .unwrap();
    test.service_with(StagingConfig::new().target_site(MAIN_SITE).log_synchronization(false))
        .process_task(&change)
        .unwrap();
    assert_eq!(test.replication.records().len(), 1);
}

#[test]
fn payload_entry_points() {
    let test = TestHost::new();
    let service = test.service();
    let colors = TagGroupSource::new(7, "colors").tag("red");

    let applied = service
        .process_payload(
            TaskKind::CreateObject,
            TAG_GROUP,
            &colors.change_set().encode().unwrap(),
            None,
        )
        .unwrap()
        .unwrap();
    assert_eq!(applied.object_type, TAG_GROUP);
    assert_eq!(tag_names(&test, applied.target_id), names(&["red"]));

    // Children are skipped on request.
    let shapes = TagGroupSource::new(8, "shapes").tag("circle");
    let applied = service
        .process(
            TaskKind::CreateObject,
            TAG_GROUP,
            &shapes.change_set().encode().unwrap(),
            None,
            false,
            &NoopObserver,
        )
        .unwrap()
        .unwrap();
    assert!(tag_names(&test, applied.target_id).is_empty());
}

#[test]
fn malformed_tasks_are_structural_errors() {
    let test = TestHost::new();
    let service = test.service();

    let garbage = ChangeTask::new(TaskKind::UpdateObject, TAG_GROUP, vec![0xff, 0x00]);
    let err = service.process_task(&garbage).unwrap_err();
    assert!(matches!(err, StagingError::Structural { .. }));

    let wrong_table = ChangeSet::new().with_row(TAG, Row::new().with("TagName", "red"));
    let err = service
        .process_task(&task(TaskKind::UpdateObject, TAG_GROUP, &wrong_table))
        .unwrap_err();
    assert!(matches!(err, StagingError::Structural { .. }));
    assert_eq!(test.events.entries().len(), 2);
}

#[test]
fn unknown_target_site_is_a_missing_dependency() {
    let test = TestHost::new();
    let service = test.service_with(StagingConfig::new().target_site("nowhere"));
    let err = service
        .process_task(&TagGroupSource::new(7, "colors").task())
        .unwrap_err();
    assert!(matches!(err, StagingError::DependencyNotFound { .. }));
}
