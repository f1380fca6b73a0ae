//! Status update scenarios.

mod utils;

use credibil_status::{
    Error, StatusPurpose, UpdateRequest, create_status_manager,
};

// Suspending twice is idempotent: the second call is a no-op returning the
// current status credential.
#[tokio::test]
async fn idempotent_updates() {
    let manager =
        create_status_manager(utils::options("update-idem")).await.expect("should create manager");
    let credential_id = "https://credentials.example.edu/3732";
    manager
        .allocate_supported_statuses(utils::sample_credential(credential_id))
        .await
        .expect("should allocate");

    let suspended = manager.suspend_credential(credential_id).await.expect("should suspend");
    let again = manager.suspend_credential(credential_id).await.expect("no-op suspend");

    let first = utils::decode_list(&suspended);
    let second = utils::decode_list(&again);
    assert_eq!(first, second, "second suspension should not change the list");

    let status_info = manager.get_status(credential_id).await.expect("should get status");
    assert!(!status_info[&StatusPurpose::Suspension].valid);
    assert!(status_info[&StatusPurpose::Revocation].valid);
}

// Suspension is reversible: the bit sets on suspend and clears on
// unsuspend.
#[tokio::test]
async fn suspend_and_unsuspend() {
    let manager = create_status_manager(utils::options("update-suspend"))
        .await
        .expect("should create manager");
    let credential_id = "https://credentials.example.edu/3732";
    manager
        .allocate_suspension_status(utils::sample_credential(credential_id))
        .await
        .expect("should allocate");

    let suspended = manager.suspend_credential(credential_id).await.expect("should suspend");
    assert!(utils::decode_list(&suspended).get_status(1).expect("in range"));

    let restored = manager.unsuspend_credential(credential_id).await.expect("should unsuspend");
    assert!(!utils::decode_list(&restored).get_status(1).expect("in range"));

    let status_info = manager.get_status(credential_id).await.expect("should get status");
    assert!(status_info[&StatusPurpose::Suspension].valid);
}

// A revoked credential cannot be re-activated for any purpose.
#[tokio::test]
async fn revocation_is_permanent() {
    let manager =
        create_status_manager(utils::options("update-revoked")).await.expect("should create manager");
    let credential_id = "https://credentials.example.edu/3732";
    manager
        .allocate_supported_statuses(utils::sample_credential(credential_id))
        .await
        .expect("should allocate");

    manager.revoke_credential(credential_id).await.expect("should revoke");

    let Err(Error::BadRequest(_)) = manager
        .update_status(UpdateRequest {
            credential_id: credential_id.to_string(),
            status_purpose: StatusPurpose::Revocation,
            invalidate: false,
        })
        .await
    else {
        panic!("un-revoking should be rejected");
    };

    // suspension state changes are also rejected once revoked
    let Err(Error::BadRequest(_)) = manager.suspend_credential(credential_id).await else {
        panic!("suspending a revoked credential should be rejected");
    };

    // but re-revoking stays a harmless no-op
    manager.revoke_credential(credential_id).await.expect("no-op revoke");
}

// Updates for unknown credentials and unallocated purposes are rejected.
#[tokio::test]
async fn unknown_targets_rejected() {
    let manager = create_status_manager(utils::options("update-unknown"))
        .await
        .expect("should create manager");

    let Err(Error::NotFound(_)) =
        manager.revoke_credential("https://credentials.example.edu/9999").await
    else {
        panic!("unknown credential should be NotFound");
    };

    // allocated for revocation only, so suspension has no coordinates
    let credential_id = "https://credentials.example.edu/3732";
    manager
        .allocate_revocation_status(utils::sample_credential(credential_id))
        .await
        .expect("should allocate");
    let Err(Error::BadRequest(_)) = manager.suspend_credential(credential_id).await else {
        panic!("unallocated purpose should be BadRequest");
    };
}

// Every status change lands in the bit position recorded for the
// credential, leaving neighbours untouched.
#[tokio::test]
async fn neighbouring_bits_untouched() {
    let manager = create_status_manager(utils::options("update-neighbours"))
        .await
        .expect("should create manager");

    for position in 1..=3 {
        let id = format!("https://credentials.example.edu/{position:04}");
        manager
            .allocate_revocation_status(utils::sample_credential(&id))
            .await
            .expect("should allocate");
    }

    let status_credential = manager
        .revoke_credential("https://credentials.example.edu/0002")
        .await
        .expect("should revoke");

    let list = utils::decode_list(&status_credential);
    assert!(!list.get_status(1).expect("in range"));
    assert!(list.get_status(2).expect("in range"));
    assert!(!list.get_status(3).expect("in range"));
}
