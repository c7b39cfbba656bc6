use std::future::Future;

use tokio::{sync::oneshot, task::JoinHandle};

use crate::error::Error;

pub mod kernel;

/// Creates the virtual device behind an interface name.
pub trait TunnelDriver {
    type Handle: TunnelHandle;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create(&mut self, iface: &str) -> Result<Self::Handle, Self::Error>;
}

/// A created device. `run` keeps it serviced until `stop` fires or its
/// sender is dropped.
pub trait TunnelHandle: Send + 'static {
    fn run(self, stop: oneshot::Receiver<()>) -> impl Future<Output = ()> + Send;
}

/// Owns the background task servicing the device.
#[derive(Debug)]
pub struct Supervisor {
    iface: String,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Supervisor {
    /// Creates the device and spawns its run loop. Must be called from within
    /// a tokio runtime.
    pub fn start<D: TunnelDriver>(driver: &mut D, iface: &str) -> Result<Self, Error> {
        let handle = driver.create(iface).map_err(|e| Error::DeviceStart {
            device: iface.to_string(),
            source: e.into(),
        })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let name = iface.to_string();
        let task = tokio::spawn(async move {
            handle.run(stop_rx).await;
            log::info!("wg device {name} run loop exited");
        });

        log::info!("started wg device {iface}");

        Ok(Self {
            iface: iface.to_string(),
            stop: Some(stop_tx),
            task,
        })
    }

    /// Signals the run loop once. Later calls only log. Does not wait for the
    /// loop to exit, see [`Supervisor::join`].
    pub fn stop(&mut self) {
        match self.stop.take() {
            Some(tx) => {
                log::info!("stopping wg device {}", self.iface);
                if tx.send(()).is_err() {
                    log::warn!("wg device {} run loop already gone", self.iface);
                }
            }
            None => log::debug!("wg device {} already signalled", self.iface),
        }
    }

    /// Stops the run loop if needed and waits for it to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Err(err) = (&mut self.task).await {
            log::error!("wg device {} run loop failed: {err}", self.iface);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("no such device")]
    pub struct FakeDeviceError;

    /// Counts created devices and stop notifications seen by run loops.
    #[derive(Debug, Default, Clone)]
    pub struct FakeDriver {
        pub fail: bool,
        pub created: Arc<AtomicUsize>,
        pub stops: Arc<AtomicUsize>,
        pub dropped: Arc<AtomicUsize>,
    }

    pub struct FakeHandle {
        stops: Arc<AtomicUsize>,
        dropped: Arc<AtomicUsize>,
    }

    impl TunnelDriver for FakeDriver {
        type Handle = FakeHandle;
        type Error = FakeDeviceError;

        fn create(&mut self, _iface: &str) -> Result<Self::Handle, Self::Error> {
            if self.fail {
                return Err(FakeDeviceError);
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeHandle {
                stops: self.stops.clone(),
                dropped: self.dropped.clone(),
            })
        }
    }

    impl TunnelHandle for FakeHandle {
        async fn run(self, stop: oneshot::Receiver<()>) {
            match stop.await {
                Ok(()) => self.stops.fetch_add(1, Ordering::SeqCst),
                Err(_) => self.dropped.fetch_add(1, Ordering::SeqCst),
            };
        }
    }

    #[tokio::test]
    async fn test_stop_is_delivered_once() {
        let mut driver = FakeDriver::default();
        let mut supervisor = Supervisor::start(&mut driver, "wg0").unwrap();

        supervisor.stop();
        supervisor.stop();
        supervisor.join().await;

        assert_eq!(driver.created.load(Ordering::SeqCst), 1);
        assert_eq!(driver.stops.load(Ordering::SeqCst), 1);
        assert_eq!(driver.dropped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_loop_keeps_going_until_stopped() {
        let mut driver = FakeDriver::default();
        let supervisor = Supervisor::start(&mut driver, "wg0").unwrap();

        tokio::task::yield_now().await;
        assert_eq!(driver.stops.load(Ordering::SeqCst), 0);
        assert_eq!(driver.dropped.load(Ordering::SeqCst), 0);

        supervisor.join().await;
        assert_eq!(driver.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_ends_run_loop() {
        let mut driver = FakeDriver::default();
        let supervisor = Supervisor::start(&mut driver, "wg0").unwrap();
        let task_done = {
            let Supervisor { stop, task, .. } = supervisor;
            drop(stop);
            task
        };

        task_done.await.unwrap();
        assert_eq!(driver.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(driver.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_failure() {
        let mut driver = FakeDriver {
            fail: true,
            ..Default::default()
        };

        let err = Supervisor::start(&mut driver, "wg0").unwrap_err();

        assert!(matches!(err, Error::DeviceStart { ref device, .. } if device == "wg0"));
    }
}
