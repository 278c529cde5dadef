//! Process-wide debug mode. Kept in its own test binary because the switch
//! is global.

mod common;

use common::mock_registry;
use devlink_transport::debug;
use devlink_transport::traits::DeviceConnection;

#[tokio::test]
async fn test_debug_mode_is_applied_on_open() {
    let (registry, handles) = mock_registry(&["mock"]);
    let id = handles[0].add_device("nano", "Nano S").unwrap();

    debug::set_debug_mode(true);
    let mut connection = registry.open(&id).await.unwrap();

    assert!(debug::debug_mode());
    assert!(connection.debug_mode());
    assert_eq!(handles[0].last_debug_mode(), Some(true));

    // Tracing never changes what goes over the wire.
    let reply = connection.exchange(&[0xB0, 0x01, 0x00, 0x00]).await.unwrap();
    assert_eq!(reply.as_ref(), &[0x90, 0x00]);
    assert_eq!(handles[0].exchanges(), vec![vec![0xB0, 0x01, 0x00, 0x00]]);
}
