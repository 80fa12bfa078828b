use crate::{
    AssetFetcher, HttpFetcher, LoadResult, Priority, RequestKey, RequestTicket, RequestThrottler,
    RetryPolicy, StartCommand, ThrottlerConfig,
};
use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task};
use bevy::utils::HashMap;
use std::sync::Arc;

pub struct LoaderPlugin;

impl Plugin for LoaderPlugin {
    fn build(&self, app: &mut App) {
        if !app.world.contains_resource::<ResourceLoader>() {
            app.insert_resource(ResourceLoader::new(
                Arc::new(HttpFetcher),
                ThrottlerConfig::default(),
                RetryPolicy::default(),
            ));
        }
        app.add_event::<LoaderCommand>();
        app.add_systems(
            Update,
            (apply_loader_commands, pump_loader, deliver_completions).chain(),
        );
    }
}

/// Control surface other plugins drive the loader through.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderCommand {
    Pause,
    Resume,
    CancelAll,
    SetMoving(bool),
}

/// The throttler plus the task handles of its in-flight fetches. Dropping a
/// handle aborts the fetch, which is how cancellation reaches the network.
#[derive(Resource)]
pub struct ResourceLoader {
    throttler: RequestThrottler,
    fetcher: Arc<dyn AssetFetcher>,
    retry: RetryPolicy,
    outcome_tx: async_channel::Sender<(RequestKey, LoadResult)>,
    outcome_rx: async_channel::Receiver<(RequestKey, LoadResult)>,
    tasks: HashMap<RequestKey, Task<()>>,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: ThrottlerConfig, retry: RetryPolicy) -> Self {
        let (outcome_tx, outcome_rx) = async_channel::unbounded();
        ResourceLoader {
            throttler: RequestThrottler::new(config),
            fetcher,
            retry,
            outcome_tx,
            outcome_rx,
            tasks: HashMap::default(),
        }
    }

    pub fn request(&mut self, key: RequestKey, priority: Priority) -> RequestTicket {
        self.throttler.request(key, priority)
    }

    pub fn cancel_all(&mut self) {
        let aborted = self.throttler.cancel_all();
        for key in &aborted {
            self.tasks.remove(key);
        }
    }

    pub fn set_moving(&mut self, moving: bool) {
        self.throttler.set_moving(moving);
    }

    pub fn pause(&mut self) {
        self.throttler.pause();
    }

    pub fn resume(&mut self) {
        self.throttler.resume();
    }

    pub fn active_count(&self) -> usize {
        self.throttler.active_count()
    }

    pub fn queued_count(&self) -> usize {
        self.throttler.queued_count()
    }

    fn start(&mut self, command: StartCommand) {
        let fetcher = self.fetcher.clone();
        let retry = self.retry;
        let outcome_tx = self.outcome_tx.clone();
        let key = command.key.clone();
        let url = key.request_url();
        let task = AsyncComputeTaskPool::get().spawn(async move {
            let result = crate::run_fetch(fetcher, url, retry).await;
            if let Err(e) = outcome_tx.send((key, result)).await {
                bevy::log::error!("failed to deliver a fetch outcome: {:?}", e);
            }
        });
        self.tasks.insert(command.key, task);
    }
}

fn apply_loader_commands(
    mut events: EventReader<LoaderCommand>,
    mut loader: ResMut<ResourceLoader>,
) {
    for command in events.iter() {
        match command {
            LoaderCommand::Pause => loader.pause(),
            LoaderCommand::Resume => loader.resume(),
            LoaderCommand::CancelAll => loader.cancel_all(),
            LoaderCommand::SetMoving(moving) => loader.set_moving(*moving),
        }
    }
}

fn pump_loader(mut loader: ResMut<ResourceLoader>) {
    let commands = loader.throttler.pump();
    for command in commands {
        loader.start(command);
    }
}

fn deliver_completions(mut loader: ResMut<ResourceLoader>) {
    while let Ok((key, result)) = loader.outcome_rx.try_recv() {
        loader.tasks.remove(&key);
        loader.throttler.complete(&key, result);
    }
}
