use crate::membership::domain::User;
use crate::membership::eligibility::{
    Eligibility, EligibilityPolicy, IneligibleReason, RoleEligibilityPolicy,
};

#[test]
fn teacher_role_is_eligible_by_default() {
    let policy = RoleEligibilityPolicy::default();
    let user = User::new(1).with_role("teacher");
    assert_eq!(policy.classify(&user), Eligibility::Eligible);
}

#[test]
fn role_matching_ignores_case_and_whitespace() {
    let policy = RoleEligibilityPolicy::new(["Teacher", "staff "]);
    assert!(policy
        .classify(&User::new(1).with_role("  TEACHER "))
        .is_eligible());
    assert!(policy.classify(&User::new(2).with_role("Staff")).is_eligible());
}

#[test]
fn other_roles_are_ineligible() {
    let policy = RoleEligibilityPolicy::default();
    assert_eq!(
        policy.classify(&User::new(2).with_role("guest")),
        Eligibility::Ineligible(IneligibleReason::RoleNotEligible("guest".to_string()))
    );
}

#[test]
fn missing_or_blank_role_fails_safe() {
    let policy = RoleEligibilityPolicy::default();
    let expected = Eligibility::Ineligible(IneligibleReason::MissingRole);

    assert_eq!(policy.classify(&User::new(1)), expected);
    assert_eq!(policy.classify(&User::new(2).with_role("   ")), expected);
    assert_eq!(policy.classify(&User::new(3).with_role("")), expected);
}

#[test]
fn blocked_account_status_overrides_role() {
    let policy = RoleEligibilityPolicy::default();
    let suspended = User::new(4).with_role("teacher").with_status("Suspended");
    assert_eq!(
        policy.classify(&suspended),
        Eligibility::Ineligible(IneligibleReason::BlockedStatus("suspended".to_string()))
    );

    let active = User::new(5).with_role("teacher").with_status("active");
    assert!(policy.classify(&active).is_eligible());
}

#[test]
fn blocked_statuses_can_be_replaced() {
    let policy = RoleEligibilityPolicy::default().with_blocked_statuses(["pending_review"]);
    assert!(policy
        .classify(&User::new(1).with_role("teacher").with_status("suspended"))
        .is_eligible());
    assert!(!policy
        .classify(&User::new(2).with_role("teacher").with_status("pending_review"))
        .is_eligible());
}

#[test]
fn classification_is_deterministic() {
    let policy = RoleEligibilityPolicy::default();
    let users = [
        User::new(1).with_role("teacher"),
        User::new(2),
        User::new(3).with_role("guest").with_status("deleted"),
    ];

    for user in &users {
        let first = policy.classify(user);
        for _ in 0..5 {
            assert_eq!(policy.classify(user), first);
        }
    }
}

#[test]
fn closures_act_as_policies() {
    let has_email = |user: &User| {
        if user.email.is_some() {
            Eligibility::Eligible
        } else {
            Eligibility::Ineligible(IneligibleReason::MissingRole)
        }
    };

    assert!(has_email
        .classify(&User::new(1).with_email("a@example.org"))
        .is_eligible());
    assert!(!has_email.classify(&User::new(2)).is_eligible());
}

#[test]
fn reasons_render_for_logs() {
    assert_eq!(IneligibleReason::MissingRole.to_string(), "role missing");
    assert_eq!(
        IneligibleReason::RoleNotEligible("guest".to_string()).to_string(),
        "role 'guest' not eligible"
    );
}
