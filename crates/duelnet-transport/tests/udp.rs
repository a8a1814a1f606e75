//! Integration tests for the UDP channel.
//!
//! These bind real sockets on loopback with OS-chosen ports and check that
//! datagrams flow in both directions with the right sender address.

#[cfg(feature = "udp")]
mod udp {
    use std::time::Duration;

    use duelnet_transport::{DatagramChannel, UdpChannel};

    async fn bind_loopback() -> UdpChannel {
        UdpChannel::bind("127.0.0.1:0")
            .await
            .expect("should bind")
    }

    #[tokio::test]
    async fn test_udp_send_and_receive_both_directions() {
        let host = bind_loopback().await;
        let joiner = bind_loopback().await;

        joiner
            .send_to(host.local_addr(), b"hello from joiner")
            .await
            .expect("send should succeed");

        let (data, from) = tokio::time::timeout(
            Duration::from_secs(5),
            host.recv_from(),
        )
        .await
        .expect("recv timed out")
        .expect("recv should succeed");
        assert_eq!(data, b"hello from joiner");
        assert_eq!(from, joiner.local_addr());

        host.send_to(from, b"hello from host").await.unwrap();
        let (data, from) = tokio::time::timeout(
            Duration::from_secs(5),
            joiner.recv_from(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(data, b"hello from host");
        assert_eq!(from, host.local_addr());
    }

    #[tokio::test]
    async fn test_udp_bind_reports_assigned_port() {
        let chan = bind_loopback().await;
        assert_ne!(chan.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_udp_bind_invalid_address_fails() {
        let result = UdpChannel::bind("not an address").await;
        assert!(result.is_err());
    }
}
