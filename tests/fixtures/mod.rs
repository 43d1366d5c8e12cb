//! Shared test fixtures: an in-memory service plus registered users.
#![allow(dead_code)]

use assured::core::{CaseId, ElementId, Token};
use assured::service::{NewElement, ParentInfo, Principal, Service};

pub struct TestUser {
    pub principal: Principal,
    pub token: Token,
}

pub fn service() -> Service {
    Service::open_in_memory().expect("open in-memory service")
}

pub fn register(service: &Service, username: &str) -> TestUser {
    let user = service
        .register_user(username, &format!("{username}@example.org"))
        .expect("register user");
    let principal = service.authenticate(&user.token).expect("authenticate");
    TestUser {
        principal,
        token: user.token,
    }
}

pub fn create_case(service: &Service, owner: &TestUser, name: &str) -> CaseId {
    service
        .create_case(&owner.principal, name, "")
        .expect("create case")
        .id
}

pub fn add_goal(service: &Service, user: &TestUser, case: CaseId) -> ElementId {
    service
        .create_element(
            &user.principal,
            case,
            NewElement::Goal {
                name: Some("ignored".into()),
                short_desc: "top level goal".into(),
                long_desc: String::new(),
                keywords: String::new(),
                assumption: false,
            },
        )
        .expect("create goal")
        .id
}

pub fn add_strategy(
    service: &Service,
    user: &TestUser,
    case: CaseId,
    goal: ElementId,
) -> ElementId {
    service
        .create_element(
            &user.principal,
            case,
            NewElement::Strategy {
                name: None,
                goal_id: Some(goal),
                short_desc: String::new(),
                long_desc: String::new(),
                assumption: false,
                justification: false,
                in_sandbox: false,
            },
        )
        .expect("create strategy")
        .id
}

pub fn add_claim(
    service: &Service,
    user: &TestUser,
    case: CaseId,
    parent: ParentInfo,
) -> ElementId {
    service
        .create_element(
            &user.principal,
            case,
            NewElement::PropertyClaim {
                name: Some("ignored".into()),
                parent,
                short_desc: String::new(),
                long_desc: String::new(),
                assumption: false,
                claim_type: Default::default(),
                in_sandbox: false,
            },
        )
        .expect("create claim")
        .id
}

pub fn add_evidence(
    service: &Service,
    user: &TestUser,
    case: CaseId,
    claim: ElementId,
) -> ElementId {
    service
        .create_element(
            &user.principal,
            case,
            NewElement::Evidence {
                name: None,
                property_claim_id: Some(claim),
                short_desc: String::new(),
                long_desc: String::new(),
                url: Some("https://example.org/evidence".into()),
                in_sandbox: false,
            },
        )
        .expect("create evidence")
        .id
}
