//! The permission matrix and sharing flows.

mod fixtures;

use assured::service::{CaseFilter, CasePatch, Patch, ShareEntry};

use fixtures::{create_case, register, service};

fn share(view: Option<bool>, edit: Option<bool>, review: Option<bool>, email: &str) -> ShareEntry {
    ShareEntry {
        email: email.to_string(),
        view,
        edit,
        review,
    }
}

#[test]
fn strangers_are_forbidden_not_lost() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "private");

    let err = service
        .get_case(&bob.principal, case)
        .expect_err("stranger read");
    assert_eq!(err.code(), "forbidden");
}

#[test]
fn view_grants_read_but_not_write() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "shared");

    service
        .share_with(
            &alice.principal,
            case,
            &[share(Some(true), None, None, "bob@example.org")],
        )
        .expect("share view");

    assert!(service.get_case(&bob.principal, case).is_ok());

    let patch = CasePatch {
        name: Patch::Set("renamed".into()),
        ..CasePatch::default()
    };
    let err = service
        .update_case(&bob.principal, case, patch, None)
        .expect_err("viewer write");
    assert_eq!(err.code(), "forbidden");

    // The owner writes fine.
    let patch = CasePatch {
        name: Patch::Set("renamed".into()),
        ..CasePatch::default()
    };
    assert!(service.update_case(&alice.principal, case, patch, None).is_ok());
}

#[test]
fn promotion_to_edit_allows_writes_but_not_delete() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "promote");

    service
        .share_with(
            &alice.principal,
            case,
            &[share(None, Some(true), None, "bob@example.org")],
        )
        .expect("share edit");

    let patch = CasePatch {
        description: Patch::Set("bob was here".into()),
        ..CasePatch::default()
    };
    assert!(service.update_case(&bob.principal, case, patch, None).is_ok());

    let err = service
        .delete_case(&bob.principal, case)
        .expect_err("editor delete");
    assert_eq!(err.code(), "forbidden");

    assert!(service.delete_case(&alice.principal, case).is_ok());
}

#[test]
fn revoking_a_grant_downgrades_the_role() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "revoke");

    service
        .share_with(
            &alice.principal,
            case,
            &[share(Some(true), Some(true), None, "bob@example.org")],
        )
        .expect("grant");
    service
        .share_with(
            &alice.principal,
            case,
            &[share(None, Some(false), None, "bob@example.org")],
        )
        .expect("revoke edit");

    // Still a viewer, no longer an editor.
    assert!(service.get_case(&bob.principal, case).is_ok());
    let patch = CasePatch {
        name: Patch::Set("nope".into()),
        ..CasePatch::default()
    };
    let err = service
        .update_case(&bob.principal, case, patch, None)
        .expect_err("revoked editor");
    assert_eq!(err.code(), "forbidden");
}

#[test]
fn share_state_lists_canonical_group_members() {
    let service = service();
    let alice = register(&service, "alice");
    register(&service, "bob");
    let case = create_case(&service, &alice, "state");

    let state = service
        .share_with(
            &alice.principal,
            case,
            &[share(Some(true), None, Some(true), "bob@example.org")],
        )
        .expect("share");
    assert_eq!(state.view, ["bob"]);
    assert_eq!(state.review, ["bob"]);
    assert!(state.edit.is_empty());

    let read_back = service
        .share_state(&alice.principal, case)
        .expect("read share state");
    assert_eq!(read_back.view, ["bob"]);
}

#[test]
fn share_surface_is_owner_only() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "owner-only");

    service
        .share_with(
            &alice.principal,
            case,
            &[share(None, Some(true), None, "bob@example.org")],
        )
        .expect("share");

    // Even an editor cannot read or change the share state.
    assert_eq!(
        service
            .share_state(&bob.principal, case)
            .expect_err("editor reads shares")
            .code(),
        "forbidden"
    );
    assert_eq!(
        service
            .share_with(
                &bob.principal,
                case,
                &[share(Some(true), None, None, "alice@example.org")],
            )
            .expect_err("editor shares")
            .code(),
        "forbidden"
    );
}

#[test]
fn list_cases_respects_filters() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let mine = create_case(&service, &alice, "mine");
    let theirs = create_case(&service, &bob, "theirs");

    service
        .share_with(
            &bob.principal,
            theirs,
            &[share(Some(true), None, None, "alice@example.org")],
        )
        .expect("share");

    let all = service
        .list_cases(&alice.principal, CaseFilter::All)
        .expect("list all");
    let ids: Vec<_> = all.iter().map(|c| c.id).collect();
    assert!(ids.contains(&mine));
    assert!(ids.contains(&theirs));

    let owned = service
        .list_cases(&alice.principal, CaseFilter::Owner)
        .expect("list owned");
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, mine);

    let editable = service
        .list_cases(&alice.principal, CaseFilter::Edit)
        .expect("list editable");
    assert_eq!(editable.len(), 1);
    assert_eq!(editable[0].id, mine);
}

#[test]
fn bad_tokens_are_unauthenticated() {
    let service = service();
    let err = service
        .authenticate(&assured::core::Token::parse("missing").expect("token"))
        .expect_err("unknown token");
    assert_eq!(err.code(), "unauthenticated");
}
