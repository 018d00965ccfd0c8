use crate::attachments::{AttachmentStaging, InlineStaging};
use crate::dispatcher::OutboundDispatcher;
use crate::error::{BridgeError, Result};
use crate::poller::{EventPoller, PollExit, PollTimings};
use crate::session::SessionManager;
use crate::streams::StreamDirectory;
use crate::topics::TopicResolver;
use crate::traits::Bridge;
use crate::types::{ChannelInfo, InboundMessage, OutboundMessage};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zb_api::ZulipApi;

#[derive(Debug, Clone)]
pub struct ZulipSettings {
    /// Our own login email; events sent from it are not relayed back.
    pub login: String,
    pub account: String,
    pub default_topic: Option<String>,
    pub timings: PollTimings,
}

impl ZulipSettings {
    pub fn new(login: &str, account: &str) -> Self {
        Self {
            login: login.to_string(),
            account: account.to_string(),
            default_topic: None,
            timings: PollTimings::default(),
        }
    }

    pub fn with_default_topic(mut self, default_topic: Option<String>) -> Self {
        self.default_topic = default_topic;
        self
    }

    pub fn with_timings(mut self, timings: PollTimings) -> Self {
        self.timings = timings;
        self
    }
}

struct PollTask {
    stop: CancellationToken,
    handle: JoinHandle<PollExit>,
}

#[derive(Clone)]
pub struct ZulipBridge {
    api: Arc<dyn ZulipApi>,
    settings: ZulipSettings,
    sessions: Arc<SessionManager>,
    streams: Arc<StreamDirectory>,
    topics: Arc<TopicResolver>,
    dispatcher: Arc<OutboundDispatcher>,
    shutdown: CancellationToken,
    poll_task: Arc<Mutex<Option<PollTask>>>,
}

impl ZulipBridge {
    pub fn new(api: Arc<dyn ZulipApi>, settings: ZulipSettings) -> Self {
        let topics = Arc::new(TopicResolver::new(settings.default_topic.clone()));
        let dispatcher = Arc::new(OutboundDispatcher::new(
            api.clone(),
            topics.clone(),
            Arc::new(InlineStaging::default()),
        ));
        Self {
            sessions: Arc::new(SessionManager::new(api.clone())),
            streams: Arc::new(StreamDirectory::new(api.clone())),
            api,
            settings,
            topics,
            dispatcher,
            shutdown: CancellationToken::new(),
            poll_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_staging(mut self, staging: Arc<dyn AttachmentStaging>) -> Self {
        self.dispatcher = Arc::new(OutboundDispatcher::new(
            self.api.clone(),
            self.topics.clone(),
            staging,
        ));
        self
    }

    /// Tie the poll task to a process-wide shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

#[async_trait::async_trait]
impl Bridge for ZulipBridge {
    fn account(&self) -> &str {
        &self.settings.account
    }

    async fn connect(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut poll_task = self.poll_task.lock().await;
        if poll_task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
        {
            return Err(BridgeError::AlreadyConnected);
        }

        let mut session = self.sessions.connect().await.inspect_err(|error| {
            tracing::error!(%error, account = %self.settings.account, "zulip connect failed");
        })?;
        self.streams.prime().await;

        let stop = self.shutdown.child_token();
        let poller = EventPoller::new(
            self.api.clone(),
            self.sessions.clone(),
            self.streams.clone(),
            &self.settings.login,
            &self.settings.account,
            self.settings.timings,
            tx,
            stop.clone(),
        );
        let handle = tokio::spawn(async move {
            let exit = poller.run(&mut session).await;
            tracing::info!(?exit, cursor = ?session.cursor(), "zulip poll loop exited");
            exit
        });
        *poll_task = Some(PollTask { stop, handle });
        tracing::info!(account = %self.settings.account, "zulip connection succeeded");
        Ok(())
    }

    async fn join_channel(&self, channel: ChannelInfo) -> Result<()> {
        tracing::debug!(channel = %channel.name, topic = %channel.topic, "zulip channel joined");
        self.topics.bind(&channel.name, &channel.topic).await;
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> Result<String> {
        tracing::debug!(?message, "zulip outbound message");
        self.dispatcher.send(message).await
    }

    async fn disconnect(&self) -> Result<()> {
        let task = self.poll_task.lock().await.take();
        let Some(task) = task else {
            return Ok(());
        };
        task.stop.cancel();
        if let Err(error) = task.handle.await {
            tracing::error!(%error, "zulip poll task panicked");
        }
        Ok(())
    }
}
