//! Background loop runner: the body of the dedicated loop thread.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error};

use crate::event_loop::EventLoop;
use crate::state::SharedState;

pub(crate) struct LoopRunner;

impl LoopRunner {
    /// Spawn the loop thread.
    ///
    /// The thread builds the loop with `build`, publishes its handle,
    /// schedules the loop-started marker as the first unit of work and
    /// pumps until quit.
    pub(crate) fn start<B>(
        thread_name: &str,
        shared: Arc<SharedState>,
        build: B,
    ) -> io::Result<JoinHandle<()>>
    where
        B: FnOnce() -> io::Result<EventLoop> + Send + 'static,
    {
        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || Self::run(&shared, build))
    }

    fn run<B>(shared: &Arc<SharedState>, build: B)
    where
        B: FnOnce() -> io::Result<EventLoop>,
    {
        let event_loop = match build() {
            Ok(event_loop) => event_loop,
            Err(e) => {
                error!(error = %e, "failed to build bus loop");
                shared.mark_startup_failed(e.to_string());
                return;
            }
        };

        let handle = event_loop.handle();
        shared.publish_handle(handle.clone());

        let marker = Arc::clone(shared);
        handle.spawn(async move { marker.mark_started() });

        debug!("bus loop pumping");
        event_loop.run();
        debug!("bus loop stopped");

        // Observers see no handle from here on, before the loop is dropped.
        shared.clear_handle();
        drop(event_loop);
    }
}
