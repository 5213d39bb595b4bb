use std::time::Duration;

use integration_tests::prelude::*;
use sdoex_client::{Bus, BusProvider, SdoNode};
use sdoex_eds::DataType;
use serial_test::serial;

const NODE_ID: u8 = 1;

fn node_id() -> NodeId {
    NodeId::new(NODE_ID).unwrap()
}

#[tokio::test]
#[serial]
async fn test_expedited_write_and_read() {
    let mut bus = SimBus::new();
    let mut node = SimNode::new(node_id(), &mut bus).with_object(0x3000, 0, [0u8; 4]);
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async move {
        client
            .download(0x3000, 0, &[0xa, 0xb, 0xc, 0xd])
            .await
            .unwrap();
        let read = client.upload(0x3000, 0).await.unwrap();
        assert_eq!(vec![0xa, 0xb, 0xc, 0xd], read);

        client.write_u32(0x3000, 0, 0xDEAD_BEEF).await.unwrap();
        assert_eq!(0xDEAD_BEEF, client.read_u32(0x3000, 0).await.unwrap());
    };
    test_with_background_node(&mut node, test_task).await;

    assert_eq!(Some(&0xDEAD_BEEFu32.to_le_bytes()[..]), node.object(0x3000, 0));
}

#[tokio::test]
#[serial]
async fn test_short_expedited_write() {
    let mut bus = SimBus::new();
    let mut node = SimNode::new(node_id(), &mut bus).with_object(0x3001, 2, [0u8; 2]);
    let writes = node.write_log();
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async move {
        client.write_u16(0x3001, 2, 0x1234).await.unwrap();
        assert_eq!(0x1234, client.read_u16(0x3001, 2).await.unwrap());
        // Reading with the wrong width is reported rather than truncated
        assert_eq!(
            Err(SdoClientError::UnexpectedSize),
            client.read_u32(0x3001, 2).await
        );
    };
    test_with_background_node(&mut node, test_task).await;

    assert_eq!(vec![vec![0x34, 0x12]], writes.payloads());
}

#[tokio::test]
#[serial]
async fn test_segmented_transfers() {
    let mut bus = SimBus::new();
    let mut node = SimNode::new(node_id(), &mut bus).with_object(0x3006, 0, Vec::<u8>::new());
    let writes = node.write_log();
    let mut client = get_sdo_client(&mut bus, NODE_ID);
    let _logger = BusLogger::new(bus.new_receiver());

    let test_task = async move {
        // Exactly one full segment, then a length needing a partial final segment
        for len in [7usize, 30] {
            let data = Vec::from_iter((0..len).map(|i| i as u8));
            client.download(0x3006, 0, &data).await.unwrap();
            let read = client.upload(0x3006, 0).await.unwrap();
            assert_eq!(data, read);
        }
    };
    test_with_background_node(&mut node, test_task).await;

    assert_eq!(2, writes.len());
    assert_eq!(30, writes.records()[1].data.len());
}

#[tokio::test]
#[serial]
async fn test_read_device_name() {
    let mut bus = SimBus::new();
    let mut node =
        SimNode::new(node_id(), &mut bus).with_object(0x1008, 0, b"Simulated counter".to_vec());
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async move {
        assert_eq!("Simulated counter", client.read_device_name().await.unwrap());
    };
    test_with_background_node(&mut node, test_task).await;
}

#[tokio::test]
#[serial]
async fn test_abort_is_reported() {
    let mut bus = SimBus::new();
    let mut node = SimNode::new(node_id(), &mut bus)
        .with_object(0x3000, 0, [0u8; 4])
        .with_write_hook(|_, _, _| WriteOutcome::Abort(AbortCode::ReadOnly));
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async move {
        assert_eq!(
            Err(SdoClientError::ServerAbort {
                index: 0x3000,
                sub: 0,
                abort_code: RawAbortCode::Valid(AbortCode::ReadOnly),
            }),
            client.download(0x3000, 0, &[1, 2, 3, 4]).await
        );
        assert_eq!(
            Err(SdoClientError::ServerAbort {
                index: 0x5000,
                sub: 1,
                abort_code: RawAbortCode::Valid(AbortCode::NoSuchObject),
            }),
            client.upload(0x5000, 1).await
        );
    };
    test_with_background_node(&mut node, test_task).await;
}

#[tokio::test]
#[serial]
async fn test_no_response() {
    let mut bus = SimBus::new();
    // A node with a different ID does not answer
    let mut node = SimNode::new(NodeId::new(NODE_ID + 1).unwrap(), &mut bus)
        .with_object(0x3000, 0, [0u8; 4]);
    let mut client = get_sdo_client(&mut bus, NODE_ID);
    client.set_timeout(Duration::from_millis(20));

    let test_task = async move {
        assert_eq!(
            Err(SdoClientError::NoResponse),
            client.download(0x3000, 0, &[1, 2, 3, 4]).await
        );
    };
    test_with_background_node(&mut node, test_task).await;
    assert!(node.write_log().is_empty());
}

#[tokio::test]
#[serial]
async fn test_remote_node() {
    let mut bus = SimBus::new();
    let mut node = SimNode::new(node_id(), &mut bus).with_object(0x4000, 0, [0u8; 4]);
    let provider = SimProvider::new(&bus, &["sim0"]);

    let mut connection = provider.connect("sim0").unwrap();
    let mut remote = connection.add_node(node_id(), &counter_eds_path()).unwrap();
    assert_eq!(1, provider.nodes_added());
    assert_eq!(node_id(), remote.node_id());

    let od = remote.object_dictionary().unwrap();
    assert_eq!(Some("Counter Node"), od.device_info.product_name.as_deref());
    let counter = od.sub_object(0x4000, 0).unwrap();
    assert_eq!("Counter", counter.name);
    assert_eq!(DataType::UInt32, counter.data_type);
    assert!(counter.access_type.is_writable());

    let test_task = async {
        remote.download(0x4000, 0, &7u32.to_le_bytes()).await.unwrap();
        assert_eq!(7, remote.sdo_client().read_u32(0x4000, 0).await.unwrap());
    };
    test_with_background_node(&mut node, test_task).await;
}
