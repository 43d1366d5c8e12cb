//! Graph rule rejections.

mod fixtures;

use assured::service::{NewElement, ParentInfo};

use fixtures::{add_claim, add_goal, add_strategy, create_case, register, service};

#[test]
fn claim_with_two_parent_refs_is_an_invariant_violation() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "two-parents");
    let goal = add_goal(&service, &owner, case);
    let strategy = add_strategy(&service, &owner, case, goal);

    let mut parent = ParentInfo::goal(goal);
    parent.strategy_id = Some(strategy);

    let err = service
        .create_element(
            &owner.principal,
            case,
            NewElement::PropertyClaim {
                name: None,
                parent,
                short_desc: String::new(),
                long_desc: String::new(),
                assumption: false,
                claim_type: Default::default(),
                in_sandbox: false,
            },
        )
        .expect_err("two parents");
    assert_eq!(err.code(), "invariant");
}

#[test]
fn claim_cannot_become_its_own_parent() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "self-parent");
    let goal = add_goal(&service, &owner, case);
    let claim = add_claim(&service, &owner, case, ParentInfo::goal(goal));

    let err = service
        .set_claim_parent(&owner.principal, claim, ParentInfo::claim(claim))
        .expect_err("self parent");
    assert_eq!(err.code(), "invariant");
}

#[test]
fn attaching_under_a_descendant_is_a_conflict() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "cycle");
    let goal = add_goal(&service, &owner, case);
    let parent = add_claim(&service, &owner, case, ParentInfo::goal(goal));
    let child = add_claim(&service, &owner, case, ParentInfo::claim(parent));

    let err = service
        .set_claim_parent(&owner.principal, parent, ParentInfo::claim(child))
        .expect_err("cycle");
    assert_eq!(err.code(), "conflict");
}

#[test]
fn evidence_cannot_link_across_cases() {
    let service = service();
    let owner = register(&service, "u1");
    let case_a = create_case(&service, &owner, "case-a");
    let case_b = create_case(&service, &owner, "case-b");

    let goal_a = add_goal(&service, &owner, case_a);
    let claim_a = add_claim(&service, &owner, case_a, ParentInfo::goal(goal_a));
    let evidence = fixtures::add_evidence(&service, &owner, case_a, claim_a);

    let goal_b = add_goal(&service, &owner, case_b);
    let claim_b = add_claim(&service, &owner, case_b, ParentInfo::goal(goal_b));

    let err = service
        .attach(&owner.principal, evidence, ParentInfo::claim(claim_b))
        .expect_err("cross-case link");
    assert_eq!(err.code(), "invariant");
}

#[test]
fn creating_a_claim_under_a_foreign_parent_is_cross_case() {
    let service = service();
    let owner = register(&service, "u1");
    let case_a = create_case(&service, &owner, "a");
    let case_b = create_case(&service, &owner, "b");
    let goal_b = add_goal(&service, &owner, case_b);

    let err = service
        .create_element(
            &owner.principal,
            case_a,
            NewElement::PropertyClaim {
                name: None,
                parent: ParentInfo::goal(goal_b),
                short_desc: String::new(),
                long_desc: String::new(),
                assumption: false,
                claim_type: Default::default(),
                in_sandbox: false,
            },
        )
        .expect_err("foreign parent");
    assert_eq!(err.code(), "invariant");
}

#[test]
fn stale_versions_are_conflicts() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "versions");
    let goal = add_goal(&service, &owner, case);

    let patch = assured::service::ElementPatch {
        short_desc: assured::service::Patch::Set("first".into()),
        ..Default::default()
    };
    let updated = service
        .update_element(&owner.principal, goal, patch, Some(1))
        .expect("first update");
    assert_eq!(updated.version, 2);

    let stale = assured::service::ElementPatch {
        short_desc: assured::service::Patch::Set("second".into()),
        ..Default::default()
    };
    let err = service
        .update_element(&owner.principal, goal, stale, Some(1))
        .expect_err("stale version");
    assert_eq!(err.code(), "conflict");
}

#[test]
fn parent_references_are_not_patchable() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "patch");
    let goal = add_goal(&service, &owner, case);

    // `url` does not exist on goals; field patches never reach parents.
    let patch = assured::service::ElementPatch {
        url: assured::service::Patch::Set("https://x".into()),
        ..Default::default()
    };
    let err = service
        .update_element(&owner.principal, goal, patch, None)
        .expect_err("foreign field");
    assert_eq!(err.code(), "validation");
}

#[test]
fn unknown_elements_are_not_found() {
    let service = service();
    let owner = register(&service, "u1");
    create_case(&service, &owner, "nf");

    let err = service
        .get_element(&owner.principal, assured::core::ElementId::generate())
        .expect_err("unknown element");
    assert_eq!(err.code(), "not_found");
}
