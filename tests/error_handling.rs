//! Error handling and edge case tests.

use channelbus::{
    AdapterBroker, BrokerConfig, BrokerError, ChannelConfig, ChannelRegistry, ScopedBroker,
};
use serde_json::json;

// --- Configuration Errors ---

#[test]
fn test_conflicting_cache_size() {
    let registry = ChannelRegistry::new();
    registry
        .create("prices", Some(ChannelConfig::replay(1)))
        .unwrap();

    let result = registry.create("prices", Some(ChannelConfig::replay(2)));

    match result {
        Err(BrokerError::ConfigConflict {
            channel,
            existing,
            requested,
        }) => {
            assert_eq!(channel, "prices");
            assert_eq!(existing, 1);
            assert_eq!(requested, 2);
        }
        other => panic!("Expected ConfigConflict, got {:?}", other),
    }

    // The original channel is untouched.
    assert_eq!(
        registry.channel_config("prices"),
        Some(ChannelConfig::replay(1))
    );
}

#[test]
fn test_conflict_after_upgrade() {
    let registry = ChannelRegistry::new();
    registry.create("prices", None).unwrap();
    registry
        .create("prices", Some(ChannelConfig::replay(4)))
        .unwrap();

    let result = registry.create("prices", Some(ChannelConfig::replay(5)));
    assert!(matches!(result, Err(BrokerError::ConfigConflict { .. })));
}

#[test]
fn test_dispose_clears_config_for_reuse() {
    let registry = ChannelRegistry::new();
    registry
        .create("prices", Some(ChannelConfig::replay(1)))
        .unwrap();
    registry.dispose("prices");

    // A fresh channel may pick any size.
    assert!(registry
        .create("prices", Some(ChannelConfig::replay(9)))
        .is_ok());
}

#[test]
fn test_zero_sized_cache_rejected() {
    let registry = ChannelRegistry::new();
    let result = registry.create("prices", Some(ChannelConfig::replay(0)));
    assert!(matches!(result, Err(BrokerError::InvalidConfig(_))));
}

#[test]
fn test_conflicting_config_file_rejected() {
    let mut config = BrokerConfig::named("app");
    config
        .channels
        .insert("prices".to_string(), ChannelConfig::replay(0));

    assert!(matches!(
        ChannelRegistry::with_config(config.clone()),
        Err(BrokerError::InvalidConfig(_))
    ));
    assert!(ScopedBroker::with_config(config).is_err());
}

#[test]
fn test_adapter_broker_requires_runtime() {
    assert!(matches!(AdapterBroker::new(), Err(BrokerError::NoRuntime)));
}

// --- Edge Cases ---

#[test]
fn test_dispose_unknown_channel() {
    let registry = ChannelRegistry::new();
    assert!(!registry.dispose("nothing"));
}

#[test]
fn test_handle_outlives_registry() {
    let registry = ChannelRegistry::new();
    let channel = registry.create("chan", None).unwrap();
    let stream = registry.get("chan");
    drop(registry);

    // Publishing and subscribing become no-ops.
    let message = channel.publish("orphan");
    assert_eq!(message.data, json!("orphan"));
    let handle = stream.subscribe_handle();
    assert!(handle.drain().is_empty());
}

#[test]
fn test_stale_handle_routes_to_recreated_channel() {
    let registry = ChannelRegistry::new();
    let stale = registry.create("chan", None).unwrap();
    registry.dispose("chan");

    let fresh = registry.create("chan", None).unwrap();
    let handle = fresh.stream().subscribe_handle();
    stale.publish("via old handle");

    assert!(!stale.ptr_eq(&fresh));
    assert_eq!(handle.drain().len(), 1);
}

#[test]
fn test_empty_channel_name() {
    let registry = ChannelRegistry::new();
    let handle = registry.get("").subscribe_handle();
    registry.create("", None).unwrap().publish(1);
    assert_eq!(handle.drain().len(), 1);
}

#[test]
fn test_destroy_twice_is_harmless() {
    let root = ScopedBroker::new("root");
    let child = root.create_scope("child");
    child.destroy();
    child.destroy();
    assert!(child.is_destroyed());
}

#[test]
fn test_invalid_payload_decode() {
    let registry = ChannelRegistry::new();
    let handle = registry.get("chan").subscribe_handle();
    registry.create("chan", None).unwrap().publish("not a number");

    let message = handle.recv().unwrap();
    assert!(matches!(
        message.decode::<u64>(),
        Err(BrokerError::Serialization(_))
    ));
}
