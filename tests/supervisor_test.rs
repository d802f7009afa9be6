//! Supervisor integration: the runner ticks the cycle from the timer and
//! applies commands queued through the handle.

mod helpers;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use helpers::{can_channel, BusCall, MockBus, MockListener, MockTimer};
use korri_comm::config::CommConfig;
use korri_comm::core::{ChannelId, ComMode, NmVariant, PartitionId, UserId};
use korri_comm::protocol::manager::CommManager;
use korri_comm::protocol::supervisor::{CommCommand, CommService};
use static_cell::StaticCell;
use tokio::time::Duration;

static COMMAND_CHANNEL: StaticCell<Channel<CriticalSectionRawMutex, CommCommand, 4>> =
    StaticCell::new();

#[tokio::test]
async fn supervisor_applies_commands_and_ticks() {
    let command_channel = COMMAND_CHANNEL.init(Channel::new());

    let channels = [can_channel(NmVariant::Full)];
    let users = [helpers::user_on(0b1)];
    let config = CommConfig {
        channels: &channels,
        users: &users,
        pncs: &[],
        partitions: 1,
        synchronous_wakeup: false,
        pnc_gateway_coordination: false,
        pnc_prepare_sleep_ms: 0,
        group_classification: 3,
    };

    let bus = MockBus::new();
    let listener = MockListener::new();
    let mut manager = CommManager::new(&config, bus.clone(), listener.clone());
    manager.pre_init().unwrap();
    manager.init().unwrap();
    manager.post_init().unwrap();

    let service = CommService::<_, _, _, 4>::new(manager, MockTimer, 5, Some(&*command_channel));
    let parts = service.into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when a command channel is provided");
    let runner_future = parts.runner.drive();

    tokio::select! {
        _ = runner_future => {
            unreachable!("the supervisor loop never returns");
        }
        _ = async {
            handle
                .communication_allowed(ChannelId(0), true)
                .await;
            handle
                .request_com_mode(UserId(0), ComMode::FullCom, PartitionId::MASTER)
                .await;

            // A few cycles later the channel is up and the user was told.
            tokio::time::sleep(Duration::from_millis(100)).await;
            let calls = bus.calls();
            assert!(calls.contains(&BusCall::Mode(0, ComMode::FullCom)));
            assert!(calls.contains(&BusCall::NmRequest(0)));
            assert_eq!(listener.notifications(), vec![(0, ComMode::FullCom)]);

            handle
                .request_com_mode(UserId(0), ComMode::NoCom, PartitionId::MASTER)
                .await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(bus.calls().contains(&BusCall::NmRelease(0)));
        } => {}
    }
}
