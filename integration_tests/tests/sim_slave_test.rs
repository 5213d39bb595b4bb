use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use integration_tests::prelude::*;
use sdoex_cli::sim::{self, SimArgs, COUNTER_GAP_ERROR_CODE};
use sdoex_client::{exerciser, CounterPlan, StopReason};
use sdoex_common::{
    constants::cob_ids,
    emcy::{error_register, Emcy},
    nmt::{Heartbeat, NmtCommand, NmtCommandSpecifier, NmtState},
    traits::{AsyncCanReceiver, AsyncCanSender},
    CanId, CanMessage,
};
use sdoex_eds::{DataType, ObjectDictionary};
use sdoex_sim::{ObjectError, ObjectValue, SimulatedSlave};
use serial_test::serial;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const NODE_ID: u8 = 6;

type Slave = SimulatedSlave<SimBusSender, SimBusReceiver>;

fn node_id() -> NodeId {
    NodeId::new(NODE_ID).unwrap()
}

fn counter_slave(bus: &mut SimBus) -> Slave {
    let od = ObjectDictionary::load(counter_eds_path(), Some(node_id())).unwrap();
    let (sender, receiver) = bus.new_port();
    SimulatedSlave::from_eds(node_id(), &od, sender, receiver)
}

/// Run `test_task` while `slave` runs in the background
async fn with_slave<T>(slave: &mut Slave, test_task: impl Future<Output = T>) -> T {
    tokio::select! {
        result = slave.run(CancellationToken::new()) => panic!("Slave exited: {result:?}"),
        output = test_task => output,
    }
}

/// Wait for the next frame with the given ID, discarding any others
async fn next_with_id(rx: &mut SimBusReceiver, id: CanId) -> CanMessage {
    loop {
        let msg = rx.recv().await.unwrap();
        if msg.id() == id {
            return msg;
        }
    }
}

async fn next_heartbeat(rx: &mut SimBusReceiver) -> Heartbeat {
    Heartbeat::try_from(next_with_id(rx, node_id().heartbeat_id()).await).unwrap()
}

async fn next_emcy(rx: &mut SimBusReceiver) -> Emcy {
    let msg = next_with_id(rx, node_id().emcy_id()).await;
    let (node, emcy) = Emcy::from_message(&msg).unwrap();
    assert_eq!(node_id(), node);
    emcy
}

async fn send_nmt(nmt: &mut SimBusSender, cs: NmtCommandSpecifier, node: u8) {
    nmt.send(NmtCommand { cs, node }.into()).await.unwrap();
}

fn assert_elapsed(since: Instant, ms: u64) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= Duration::from_millis(ms) && elapsed < Duration::from_millis(ms + 1),
        "Expected {ms} ms to pass, got {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_boot_up_and_heartbeat() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut nmt = bus.new_sender();
    let mut slave = counter_slave(&mut bus);
    slave.configure_heartbeat(100);

    let test_task = async {
        let start = Instant::now();
        assert_eq!(
            Heartbeat {
                node: node_id(),
                state: NmtState::Bootup
            },
            next_heartbeat(&mut listener).await
        );

        assert_eq!(NmtState::PreOperational, next_heartbeat(&mut listener).await.state);
        assert_elapsed(start, 100);

        send_nmt(&mut nmt, NmtCommandSpecifier::Start, NODE_ID).await;
        assert_eq!(NmtState::Operational, next_heartbeat(&mut listener).await.state);
        assert_elapsed(start, 200);

        // Commands for other nodes are ignored, broadcasts are not
        send_nmt(&mut nmt, NmtCommandSpecifier::Stop, NODE_ID + 1).await;
        assert_eq!(NmtState::Operational, next_heartbeat(&mut listener).await.state);
        send_nmt(&mut nmt, NmtCommandSpecifier::EnterPreOp, 0).await;
        assert_eq!(NmtState::PreOperational, next_heartbeat(&mut listener).await.state);
    };
    with_slave(&mut slave, test_task).await;

    assert_eq!(NmtState::PreOperational, slave.nmt_state());
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_heartbeat_period_written_by_client() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut slave = counter_slave(&mut bus);
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async {
        // The EDS disables heartbeats, so only the boot-up message is sent
        assert_eq!(NmtState::Bootup, next_heartbeat(&mut listener).await.state);

        client.write_u16(0x1017, 0, 50).await.unwrap();
        let written = Instant::now();
        assert_eq!(NmtState::PreOperational, next_heartbeat(&mut listener).await.state);
        assert_elapsed(written, 50);
        next_heartbeat(&mut listener).await;
        assert_elapsed(written, 100);

        client.write_u16(0x1017, 0, 0).await.unwrap();
        listener.flush();
        let next = tokio::time::timeout(Duration::from_secs(1), next_heartbeat(&mut listener));
        assert!(next.await.is_err());
    };
    with_slave(&mut slave, test_task).await;
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_emcy_from_write_callback() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut slave = counter_slave(&mut bus);
    slave.on_write(0x4000, 0, |ctx, _, _, data| {
        if data == [0xff; 4] {
            ctx.emcy(0x8100, error_register::MANUFACTURER);
            WriteOutcome::Abort(AbortCode::ValueTooHigh)
        } else {
            WriteOutcome::Accept
        }
    });
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async {
        client.write_u32(0x4000, 0, 1).await.unwrap();
        assert_eq!(
            Err(SdoClientError::ServerAbort {
                index: 0x4000,
                sub: 0,
                abort_code: RawAbortCode::Valid(AbortCode::ValueTooHigh),
            }),
            client.write_u32(0x4000, 0, u32::MAX).await
        );
        assert_eq!(
            Emcy {
                error_code: 0x8100,
                error_register: 0x81,
                vendor_data: [0; 5],
            },
            next_emcy(&mut listener).await
        );
        // The error register follows the last emergency
        assert_eq!(0x81, client.read_u8(0x1001, 0).await.unwrap());
        // The rejected value was not stored
        assert_eq!(1, client.read_u32(0x4000, 0).await.unwrap());
    };
    with_slave(&mut slave, test_task).await;
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_no_emcy_while_stopped() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut nmt = bus.new_sender();
    let mut slave = counter_slave(&mut bus);
    slave.on_tick(Duration::from_millis(10), |ctx| {
        ctx.emcy(0x5000, error_register::GENERIC)
    });
    let mut client = get_sdo_client(&mut bus, NODE_ID);
    client.set_timeout(Duration::from_millis(20));

    let test_task = async {
        let start = Instant::now();
        assert_eq!(0x5000, next_emcy(&mut listener).await.error_code);
        assert_elapsed(start, 10);

        send_nmt(&mut nmt, NmtCommandSpecifier::Stop, NODE_ID).await;
        let next = tokio::time::timeout(Duration::from_millis(100), next_emcy(&mut listener));
        assert!(next.await.is_err());
        // A stopped node does not serve SDO either
        assert_eq!(
            Err(SdoClientError::NoResponse),
            client.read_u8(0x1001, 0).await
        );

        send_nmt(&mut nmt, NmtCommandSpecifier::Start, NODE_ID).await;
        assert_eq!(0x5000, next_emcy(&mut listener).await.error_code);
    };
    with_slave(&mut slave, test_task).await;

    assert_eq!(Some(&[0x01][..]), slave.objects().get(0x1001, 0));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_tick_updates_named_object() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut slave = counter_slave(&mut bus);
    slave
        .register("ticks", 0x4000, 0, DataType::UInt32)
        .unwrap();
    slave.on_tick(Duration::from_millis(25), |ctx| {
        let ticks = ctx.get("ticks").unwrap().as_u64().unwrap() as u32;
        ctx.set("ticks", ticks + 1).unwrap();
    });
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async {
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(4, client.read_u32(0x4000, 0).await.unwrap());
        // Client writes and ticks share the same object
        client.write_u32(0x4000, 0, 100).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(102, client.read_u32(0x4000, 0).await.unwrap());
    };
    with_slave(&mut slave, test_task).await;

    assert_eq!(Ok(ObjectValue::U32(102)), slave.context().get("ticks"));
    assert!(matches!(
        slave.context().set("ticks", 3u8),
        Err(ObjectError::TypeMismatch { .. })
    ));
    assert!(matches!(
        slave.context().get("missing"),
        Err(ObjectError::UnknownName { .. })
    ));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_sync_callback() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut nmt = bus.new_sender();
    let mut slave = counter_slave(&mut bus);
    let syncs = Arc::new(Mutex::new(Vec::new()));
    let seen = syncs.clone();
    slave.on_sync(move |_, counter| seen.lock().unwrap().push(counter));
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let sync_id = CanId::std(cob_ids::SYNC);
    let test_task = async {
        nmt.send(CanMessage::new(sync_id, &[])).await.unwrap();
        nmt.send(CanMessage::new(sync_id, &[7])).await.unwrap();
        send_nmt(&mut nmt, NmtCommandSpecifier::Stop, NODE_ID).await;
        nmt.send(CanMessage::new(sync_id, &[8])).await.unwrap();
        send_nmt(&mut nmt, NmtCommandSpecifier::Start, NODE_ID).await;
        nmt.send(CanMessage::new(sync_id, &[9])).await.unwrap();
        // Frames are handled in order, so the response means all the above were seen
        client.read_u32(0x4000, 0).await.unwrap();
    };
    with_slave(&mut slave, test_task).await;

    assert_eq!(vec![None, Some(7), Some(9)], *syncs.lock().unwrap());
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_resets_restore_defaults() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut nmt = bus.new_sender();
    let mut slave = counter_slave(&mut bus);
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async {
        assert_eq!(NmtState::Bootup, next_heartbeat(&mut listener).await.state);
        send_nmt(&mut nmt, NmtCommandSpecifier::Start, NODE_ID).await;
        client.write_u32(0x4000, 0, 99).await.unwrap();
        client.write_u16(0x1017, 0, 1000).await.unwrap();

        // Communication reset covers only 0x1000-0x1FFF
        send_nmt(&mut nmt, NmtCommandSpecifier::ResetComm, NODE_ID).await;
        assert_eq!(NmtState::Bootup, next_heartbeat(&mut listener).await.state);
        assert_eq!(0, client.read_u16(0x1017, 0).await.unwrap());
        assert_eq!(99, client.read_u32(0x4000, 0).await.unwrap());

        send_nmt(&mut nmt, NmtCommandSpecifier::ResetApp, 0).await;
        assert_eq!(NmtState::Bootup, next_heartbeat(&mut listener).await.state);
        assert_eq!(0, client.read_u32(0x4000, 0).await.unwrap());
        assert_eq!("Counter Node", client.read_device_name().await.unwrap());
    };
    with_slave(&mut slave, test_task).await;

    assert_eq!(NmtState::PreOperational, slave.nmt_state());
}

fn sim_args() -> SimArgs {
    SimArgs {
        interface: "sim0".into(),
        node_id: node_id(),
        model: counter_eds_path(),
        heartbeat_ms: Some(500),
        tick_ms: 100,
        index: 0x4000,
        sub: 0,
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_counter_gap_raises_emcy() {
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut slave = counter_slave(&mut bus);
    sim::configure(&mut slave, &sim_args());
    let mut client = get_sdo_client(&mut bus, NODE_ID);

    let test_task = async {
        for value in [0, 1, 2, 5] {
            client.write_u32(0x4000, 0, value).await.unwrap();
        }
        assert_eq!(
            Emcy::new(COUNTER_GAP_ERROR_CODE, 0x81),
            next_emcy(&mut listener).await
        );
    };
    with_slave(&mut slave, test_task).await;

    assert_eq!(Some(&5u32.to_le_bytes()[..]), slave.objects().get(0x4000, 0));
    assert_eq!(Some(&500u16.to_le_bytes()[..]), slave.objects().get(0x1017, 0));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_exerciser_against_simulated_device() {
    const COUNT: u32 = 300;
    let _ = env_logger::try_init();
    let mut bus = SimBus::new();
    let mut listener = bus.new_receiver();
    let mut slave = counter_slave(&mut bus);
    sim::configure(&mut slave, &sim_args());
    let provider = SimProvider::new(&bus, &["sim0"]);

    let handle =
        exerciser::initialize(&provider, "sim0", node_id(), &counter_eds_path()).unwrap();
    let plan = CounterPlan {
        count: Some(COUNT),
        ..Default::default()
    };
    let summary = with_slave(
        &mut slave,
        exerciser::run(handle, &plan, CancellationToken::new()),
    )
    .await
    .unwrap();

    assert_eq!(StopReason::Exhausted, summary.reason);
    assert_eq!(COUNT as u64, summary.transfers);
    assert_eq!(
        Some(&(COUNT - 1).to_le_bytes()[..]),
        slave.objects().get(0x4000, 0)
    );
    let mut ids = Vec::new();
    while let Some(msg) = listener.try_recv() {
        ids.push(msg.id());
    }
    // In sequence throughout, so no emergencies
    assert!(!ids.contains(&node_id().emcy_id()));
    // The run is shorter than the heartbeat period, leaving only the boot-up message
    let heartbeats = ids.iter().filter(|id| **id == node_id().heartbeat_id());
    assert_eq!(1, heartbeats.count());
}
