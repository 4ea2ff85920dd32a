//! Deployment lifecycle tests through the public FSM

use gobid::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use gobid::models::deployment::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::Inactive);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.retry_count(), 0);
    assert!(!fsm.can_retry());
}

#[test]
fn test_fsm_failures_accumulate_until_success() {
    let mut fsm = DeploymentFsm::new();

    // First attempt fails
    fsm.process(DeploymentEvent::Deploy).unwrap();
    fsm.process(DeploymentEvent::DeployFailed("error 1".to_string()))
        .unwrap();
    assert_eq!(fsm.retry_count(), 1);

    // Retry fails too
    fsm.process(DeploymentEvent::Retry { stuck: false }).unwrap();
    fsm.process(DeploymentEvent::DeployFailed("error 2".to_string()))
        .unwrap();
    assert_eq!(fsm.retry_count(), 2);
    assert_eq!(fsm.error(), Some("error 2"));

    // A plain deploy from error is allowed as well
    fsm.process(DeploymentEvent::Deploy).unwrap();
    fsm.process(DeploymentEvent::DeploySuccess).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Active);
    assert_eq!(fsm.retry_count(), 0);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_cancel_and_stop_from_any_state() {
    let setups: Vec<Vec<DeploymentEvent>> = vec![
        vec![],
        vec![DeploymentEvent::Deploy],
        vec![DeploymentEvent::Deploy, DeploymentEvent::DeploySuccess],
        vec![
            DeploymentEvent::Deploy,
            DeploymentEvent::DeployFailed("boom".to_string()),
        ],
    ];

    for events in setups {
        for terminal in [DeploymentEvent::Cancel, DeploymentEvent::Stop] {
            let mut fsm = DeploymentFsm::new();
            for event in events.clone() {
                fsm.process(event).unwrap();
            }
            fsm.process(terminal.clone()).unwrap();
            assert_eq!(fsm.state(), DeploymentStatus::Inactive, "{events:?} then {terminal:?}");
            assert!(fsm.error().is_none());
        }
    }
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = DeploymentFsm::new();

    // Nothing is deploying yet
    assert!(fsm.process(DeploymentEvent::DeploySuccess).is_err());
    assert!(fsm
        .process(DeploymentEvent::DeployFailed("x".to_string()))
        .is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Inactive);

    // An active agent is redeployed, not retried
    fsm.process(DeploymentEvent::Deploy).unwrap();
    fsm.process(DeploymentEvent::DeploySuccess).unwrap();
    assert!(fsm.process(DeploymentEvent::Retry { stuck: false }).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Active);
}
