//! Detach/attach round trips and cascade boundaries.

mod fixtures;

use assured::service::{NewElement, ParentInfo};

use fixtures::{add_claim, add_evidence, add_goal, add_strategy, create_case, register, service};

#[test]
fn detach_attach_claim_roundtrip_preserves_the_graph() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "roundtrip");

    let goal = add_goal(&service, &owner, case);
    let claim = add_claim(&service, &owner, case, ParentInfo::goal(goal));
    let evidence = add_evidence(&service, &owner, case, claim);

    service
        .detach(&owner.principal, claim, None)
        .expect("detach claim");

    let view = service.get_case(&owner.principal, case).expect("view");
    assert!(view.goals[0].property_claims.is_empty());
    let sandboxed = &view.sandbox.property_claims[0];
    assert_eq!(sandboxed.id, claim);
    // Evidence stays linked and travels into the sandbox view.
    assert_eq!(sandboxed.evidence[0].id, evidence);

    service
        .attach(&owner.principal, claim, ParentInfo::goal(goal))
        .expect("attach claim");

    let view = service.get_case(&owner.principal, case).expect("view");
    assert!(view.sandbox.property_claims.is_empty());
    let restored = &view.goals[0].property_claims[0];
    assert_eq!(restored.id, claim);
    assert_eq!(restored.name.to_string(), "P1");
    assert_eq!(restored.level, 1);
    assert_eq!(restored.evidence[0].id, evidence);
}

#[test]
fn detaching_a_strategy_migrates_its_claims() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "strategy");

    let goal = add_goal(&service, &owner, case);
    let strategy = add_strategy(&service, &owner, case, goal);
    let claim = add_claim(&service, &owner, case, ParentInfo::strategy(strategy));

    service
        .detach(&owner.principal, strategy, None)
        .expect("detach strategy");

    let view = service.get_case(&owner.principal, case).expect("view");
    assert!(view.goals[0].strategies.is_empty());
    let sandboxed = &view.sandbox.strategies[0];
    assert_eq!(sandboxed.id, strategy);
    // The claim is still attached to the (now sandboxed) strategy.
    assert_eq!(sandboxed.property_claims[0].id, claim);
}

#[test]
fn detaching_twice_is_a_state_error() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "twice");

    let goal = add_goal(&service, &owner, case);
    let claim = add_claim(&service, &owner, case, ParentInfo::goal(goal));

    service.detach(&owner.principal, claim, None).expect("detach");
    let err = service
        .detach(&owner.principal, claim, None)
        .expect_err("second detach must fail");
    assert_eq!(err.code(), "state");
}

#[test]
fn evidence_detach_removes_one_link_at_a_time() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "links");

    let goal = add_goal(&service, &owner, case);
    let first = add_claim(&service, &owner, case, ParentInfo::goal(goal));
    let second = add_claim(&service, &owner, case, ParentInfo::goal(goal));
    let evidence = add_evidence(&service, &owner, case, first);

    // A second link through attach (evidence is many-to-many).
    service
        .attach(&owner.principal, evidence, ParentInfo::claim(second))
        .expect("link to second claim");

    service
        .detach(&owner.principal, evidence, Some(ParentInfo::claim(first)))
        .expect("unlink first");
    let view = service.get_case(&owner.principal, case).expect("view");
    assert!(view.sandbox.evidence.is_empty(), "still linked to second");

    service
        .detach(&owner.principal, evidence, Some(ParentInfo::claim(second)))
        .expect("unlink second");
    let view = service.get_case(&owner.principal, case).expect("view");
    assert_eq!(view.sandbox.evidence[0].id, evidence);
}

#[test]
fn deleting_a_claim_subtree_spares_shared_evidence() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "cascade");

    let goal = add_goal(&service, &owner, case);
    let parent = add_claim(&service, &owner, case, ParentInfo::goal(goal));
    let sub = add_claim(&service, &owner, case, ParentInfo::claim(parent));
    let keeper = add_claim(&service, &owner, case, ParentInfo::goal(goal));

    // Linked only to the doomed subtree.
    let orphaned = add_evidence(&service, &owner, case, sub);
    // Linked to the subtree and to a surviving claim.
    let shared = add_evidence(&service, &owner, case, sub);
    service
        .attach(&owner.principal, shared, ParentInfo::claim(keeper))
        .expect("extra link");

    let deleted = service
        .delete_element(&owner.principal, parent)
        .expect("delete subtree");
    assert!(deleted.contains(&parent));
    assert!(deleted.contains(&sub));

    let view = service.get_case(&owner.principal, case).expect("view");
    // Evidence is deleted only with its case: the orphan drops into the
    // sandbox, the shared one keeps its surviving link.
    assert_eq!(view.sandbox.evidence[0].id, orphaned);
    let keeper_view = view.goals[0]
        .property_claims
        .iter()
        .find(|c| c.id == keeper)
        .expect("keeper");
    assert_eq!(keeper_view.evidence[0].id, shared);
}

#[test]
fn nodes_can_be_created_directly_in_the_sandbox() {
    let service = service();
    let owner = register(&service, "u1");
    let case = create_case(&service, &owner, "direct");
    add_goal(&service, &owner, case);

    service
        .create_element(
            &owner.principal,
            case,
            NewElement::Context {
                name: None,
                goal_id: None,
                short_desc: String::new(),
                long_desc: String::new(),
                in_sandbox: true,
            },
        )
        .expect("sandbox context");

    let sandbox = service
        .sandbox_view(&owner.principal, case)
        .expect("sandbox view");
    assert_eq!(sandbox.contexts.len(), 1);
}
