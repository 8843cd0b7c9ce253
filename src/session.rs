//! Session orchestration: the workflows an embedded app actually calls.
//!
//! Sharing a photo to a wall, saving a photo into a named album, the order
//! (payment) dialog and parent-window scroll tracking, all built on the
//! rate-limited [`Scheduler`] and the [`PhotoUploader`].

use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::SdkConfig;
use crate::error::{SdkError, ERROR_CANCELLED_BY_USER};
use crate::events::{Lifecycle, ScrollEvent, Subscribers, Subscription};
use crate::host::{HostApi, HostEvent, HostUi, Params};
use crate::scheduler::Scheduler;
use crate::upload::{PhotoUploader, UploadTransport};

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SharePhoto {
    /// Wall owner; the current user when absent.
    pub uid: Option<i64>,
    pub message: Option<String>,
    pub photo_base64: String,
    /// Extra attachment appended after the photo.
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SavePhoto {
    pub photo_base64: String,
    pub caption: Option<String>,
    pub album_name: Option<String>,
    /// Only used when the album has to be created.
    pub album_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Success { order_id: i64 },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Default)]
struct ScrollState {
    scroll_top: i64,
    suppressed: bool,
}

type OrderReply = oneshot::Sender<Result<OrderOutcome, SdkError>>;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session<H, T> {
    scheduler: Scheduler<H>,
    uploader: PhotoUploader<T>,
    iframe_top: i64,
    scroll: Mutex<ScrollState>,
    /// At most one order dialog is outstanding.
    pending_order: Mutex<Option<OrderReply>>,
    scroll_listeners: Subscribers<ScrollEvent>,
    lifecycle_listeners: Subscribers<Lifecycle>,
}

impl<H, T> Session<H, T>
where
    H: HostApi + HostUi,
    T: UploadTransport,
{
    pub fn new(host: H, transport: T, config: &SdkConfig) -> Self {
        Self::from_parts(
            Scheduler::new(host, config),
            PhotoUploader::new(transport, config),
            config.iframe_top,
        )
    }

    pub fn from_parts(
        scheduler: Scheduler<H>,
        uploader: PhotoUploader<T>,
        iframe_top: i64,
    ) -> Self {
        Self {
            scheduler,
            uploader,
            iframe_top,
            scroll: Mutex::new(ScrollState::default()),
            pending_order: Mutex::new(None),
            scroll_listeners: Subscribers::default(),
            lifecycle_listeners: Subscribers::default(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler<H> {
        &self.scheduler
    }

    pub fn uploader(&self) -> &PhotoUploader<T> {
        &self.uploader
    }

    fn host(&self) -> &H {
        self.scheduler.host()
    }

    /// Rate-limited host API call.
    pub async fn api(&self, method: &str, params: Params) -> Result<Value, SdkError> {
        self.scheduler.invoke(method, params).await
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Initialise the host SDK and notify lifecycle subscribers.
    pub async fn init(&self) -> Result<(), SdkError> {
        let result = self.host().init(self.scheduler.api_version()).await;
        match &result {
            Ok(()) => {
                info!(version = self.scheduler.api_version(), "host sdk initialised");
                self.lifecycle_listeners.emit(&Lifecycle::InitSuccess);
            }
            Err(e) => {
                warn!(error = %e, "host sdk init failed");
                self.lifecycle_listeners
                    .emit(&Lifecycle::InitFailed(e.to_string()));
            }
        }
        result
    }

    pub fn on_lifecycle<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Lifecycle) + Send + Sync + 'static,
    {
        self.lifecycle_listeners.subscribe(listener)
    }

    pub fn unsubscribe_lifecycle(&self, id: Subscription) -> bool {
        self.lifecycle_listeners.unsubscribe(id)
    }

    // -- Share to wall --------------------------------------------------------

    /// Upload a photo to the wall and open the post confirmation. Resolves
    /// with the new post id; a user dismissal yields [`SdkError::Cancelled`].
    pub async fn share_photo(&self, req: SharePhoto) -> Result<i64, SdkError> {
        let server = self.api("photos.getWallUploadServer", Params::new()).await?;
        let upload_url = str_field(&server, "upload_url")?;
        let uploaded = self.uploader.upload(upload_url, &req.photo_base64, None).await?;

        let saved = self
            .api(
                "photos.saveWallPhoto",
                compact(json!({
                    "user_id": req.uid,
                    "server": uploaded.get("server"),
                    "hash": uploaded.get("hash"),
                    "photo": uploaded.get("photo"),
                    "caption": req.message,
                })),
            )
            .await?;

        // The mobile confirmation dialog misplaces the page unless it is
        // scrolled to the top; the guard restores the position on every exit.
        let _scroll = ScrollGuard::engage(self);

        let first = first_item(&saved)?;
        let mut attachments = format!(
            "photo{}_{}",
            plain(field(first, "owner_id")?),
            plain(field(first, "id")?)
        );
        if let Some(link) = req.link.as_deref().filter(|l| !l.is_empty()) {
            attachments.push(',');
            attachments.push_str(link);
        }

        let posted = self
            .api(
                "wall.post",
                compact(json!({
                    "message": req.message,
                    "attachments": attachments,
                    "owner_id": req.uid,
                })),
            )
            .await
            .map_err(|e| match e {
                SdkError::Api(api) if api.error_code == ERROR_CANCELLED_BY_USER => {
                    SdkError::Cancelled
                }
                other => other,
            })?;

        i64_field(&posted, "post_id")
    }

    // -- Save to album --------------------------------------------------------

    /// Upload a photo into the album with exactly `album_name` as its title,
    /// creating the album first when needed. Resolves with the photo id.
    pub async fn save_photo(&self, req: SavePhoto) -> Result<i64, SdkError> {
        let album_name = req
            .album_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(SdkError::MissingParameter("album_name"))?;

        let albums = self.api("photos.getAlbums", Params::new()).await?;
        let existing = albums
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .find(|a| a.get("title").and_then(Value::as_str) == Some(album_name))
            })
            .cloned();

        let album = match existing {
            Some(album) => album,
            None => {
                debug!(album_name, "album not found, creating");
                self.api(
                    "photos.createAlbum",
                    compact(json!({
                        "title": album_name,
                        "description": req.album_description,
                    })),
                )
                .await?
            }
        };
        let album_id = field(&album, "id")?.clone();

        let server = self
            .api(
                "photos.getUploadServer",
                compact(json!({ "album_id": album_id })),
            )
            .await?;
        let upload_url = str_field(&server, "upload_url")?;
        let uploaded = self.uploader.upload(upload_url, &req.photo_base64, None).await?;

        let saved = self
            .api(
                "photos.save",
                compact(json!({
                    "album_id": album_id,
                    "server": uploaded.get("server"),
                    "photos_list": uploaded.get("photos_list"),
                    "hash": uploaded.get("hash"),
                    "caption": req.caption,
                })),
            )
            .await?;

        i64_field(first_item(&saved)?, "id")
    }

    // -- Order dialog ---------------------------------------------------------

    /// Open the host's order box for `item` and wait for the user's decision.
    ///
    /// Only one dialog can be outstanding: opening another one resolves the
    /// earlier request with [`SdkError::OrderSuperseded`] immediately.
    pub async fn show_order_box(&self, item: &str) -> Result<OrderOutcome, SdkError> {
        let (tx, rx) = oneshot::channel();
        let previous = self.lock_order().replace(tx);
        if let Some(previous) = previous {
            warn!("order box reopened while another order was pending");
            let _ = previous.send(Err(SdkError::OrderSuperseded));
        }

        self.host()
            .call_method("showOrderBox", vec![json!({ "type": "item", "item": item })]);

        rx.await
            .map_err(|_| SdkError::Transport("order dialog channel closed".into()))?
    }

    fn settle_order(&self, outcome: Result<OrderOutcome, SdkError>) {
        match self.lock_order().take() {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => debug!(?outcome, "order event with no pending dialog"),
        }
    }

    fn lock_order(&self) -> std::sync::MutexGuard<'_, Option<OrderReply>> {
        self.pending_order
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- Window ---------------------------------------------------------------

    pub fn resize_window(&self, width: i64, height: i64) -> WindowSize {
        self.host()
            .call_method("resizeWindow", vec![json!(width), json!(height)]);
        WindowSize { width, height }
    }

    /// Scroll the parent window so that iframe offset `top` is at the top.
    pub fn scroll_window(&self, top: i64, speed: i64) {
        self.host().call_method(
            "scrollWindow",
            vec![json!(top + self.iframe_top), json!(speed)],
        );
    }

    /// Last known scroll position in iframe coordinates.
    pub fn scroll_top(&self) -> i64 {
        self.lock_scroll().scroll_top
    }

    pub fn on_window_scroll<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ScrollEvent) + Send + Sync + 'static,
    {
        let id = self.scroll_listeners.subscribe(listener);
        self.host().call_method("scrollSubscribe", vec![json!(true)]);
        id
    }

    pub fn unsubscribe_scroll(&self, id: Subscription) -> bool {
        self.scroll_listeners.unsubscribe(id)
    }

    fn lock_scroll(&self) -> std::sync::MutexGuard<'_, ScrollState> {
        self.scroll
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- Host events ----------------------------------------------------------

    /// Entry point for notifications coming from the host page.
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Scroll {
                position,
                window_height,
            } => {
                let scroll_top = {
                    let mut state = self.lock_scroll();
                    if state.suppressed {
                        return;
                    }
                    state.scroll_top = position - self.iframe_top;
                    state.scroll_top
                };
                self.scroll_listeners.emit(&ScrollEvent {
                    scroll_top,
                    window_height,
                });
            }
            HostEvent::OrderCancel => self.settle_order(Ok(OrderOutcome::Cancelled)),
            HostEvent::OrderFail { error_code } => {
                self.settle_order(Err(SdkError::OrderFailed { code: error_code }))
            }
            HostEvent::OrderSuccess { order_id } => {
                self.settle_order(Ok(OrderOutcome::Success { order_id }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scroll suppression
// ---------------------------------------------------------------------------

/// Scrolls the parent to the top and ignores host scroll notifications until
/// dropped; on drop the saved position is restored.
struct ScrollGuard<'a, H: HostUi> {
    host: &'a H,
    scroll: &'a Mutex<ScrollState>,
    saved: i64,
}

impl<'a, H: HostUi> ScrollGuard<'a, H> {
    fn engage<T>(session: &'a Session<H, T>) -> Self
    where
        H: HostApi,
        T: UploadTransport,
    {
        let saved = {
            let mut state = session.lock_scroll();
            state.suppressed = true;
            state.scroll_top
        };
        session
            .host()
            .call_method("scrollWindow", vec![json!(0), json!(0)]);
        Self {
            host: session.host(),
            scroll: &session.scroll,
            saved,
        }
    }
}

impl<H: HostUi> Drop for ScrollGuard<'_, H> {
    fn drop(&mut self) {
        match self.scroll.lock() {
            Ok(mut state) => state.suppressed = false,
            Err(poisoned) => poisoned.into_inner().suppressed = false,
        }
        self.host
            .call_method("scrollWindow", vec![json!(self.saved), json!(0)]);
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Turn a JSON object into params, dropping null (absent) values.
fn compact(value: Value) -> Params {
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => Params::new(),
    }
}

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value, SdkError> {
    value
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| SdkError::InvalidResponse(format!("missing '{key}'")))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Result<&'a str, SdkError> {
    field(value, key)?
        .as_str()
        .ok_or_else(|| SdkError::InvalidResponse(format!("'{key}' is not a string")))
}

fn i64_field(value: &Value, key: &str) -> Result<i64, SdkError> {
    field(value, key)?
        .as_i64()
        .ok_or_else(|| SdkError::InvalidResponse(format!("'{key}' is not an integer")))
}

fn first_item(value: &Value) -> Result<&Value, SdkError> {
    value
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| SdkError::InvalidResponse("expected a non-empty list".into()))
}

/// Render a scalar the way it appears inside attachment ids.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeHost {
        replies: Mutex<HashMap<String, VecDeque<Value>>>,
        api_calls: Mutex<Vec<(String, Params)>>,
        ui_calls: Mutex<Vec<(String, Vec<Value>)>>,
        init_error: Option<String>,
    }

    impl FakeHost {
        fn reply(self, method: &str, envelope: Value) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(envelope);
            self
        }

        fn methods(&self) -> Vec<String> {
            self.api_calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect()
        }

        fn params_of(&self, method: &str) -> Params {
            self.api_calls
                .lock()
                .unwrap()
                .iter()
                .find(|(m, _)| m == method)
                .map(|(_, p)| p.clone())
                .unwrap()
        }

        fn ui_calls(&self) -> Vec<(String, Vec<Value>)> {
            self.ui_calls.lock().unwrap().clone()
        }
    }

    impl HostApi for FakeHost {
        async fn api(&self, method: &str, params: &Params) -> Result<Value, SdkError> {
            self.api_calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.clone()));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| json!({ "response": {} }));
            Ok(reply)
        }
    }

    impl HostUi for FakeHost {
        async fn init(&self, _api_version: &str) -> Result<(), SdkError> {
            match &self.init_error {
                Some(e) => Err(SdkError::Transport(e.clone())),
                None => Ok(()),
            }
        }

        fn call_method(&self, name: &str, args: Vec<Value>) {
            self.ui_calls.lock().unwrap().push((name.to_string(), args));
        }
    }

    struct ProxyStub;

    impl UploadTransport for ProxyStub {
        fn supports_binary(&self) -> bool {
            true
        }

        async fn post_multipart(
            &self,
            _url: &str,
            _field: &str,
            _file_name: &str,
            _blob: Blob,
        ) -> Result<Value, SdkError> {
            Ok(json!({
                "server": 101,
                "hash": "h4sh",
                "photo": "[{\"photo\":\"x\"}]",
                "photos_list": "[{\"photo\":\"x\"}]",
            }))
        }

        async fn post_form(&self, _url: &str, _body: String) -> Result<Value, SdkError> {
            Err(SdkError::Transport("unexpected base64 upload".into()))
        }
    }

    fn session(host: FakeHost) -> Session<FakeHost, ProxyStub> {
        let config = SdkConfig {
            proxy_url: "https://proxy.test/?u=".into(),
            base64_proxy_url: "https://proxy.test/b64".into(),
            ..SdkConfig::default()
        };
        Session::new(host, ProxyStub, &config)
    }

    const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

    fn upload_server() -> Value {
        json!({ "response": { "upload_url": "https://upload.host/x" } })
    }

    fn album_request(name: &str) -> SavePhoto {
        SavePhoto {
            photo_base64: PHOTO.into(),
            caption: Some("sunset".into()),
            album_name: Some(name.into()),
            album_description: Some("trip".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_photo_uses_existing_album() {
        let host = FakeHost::default()
            .reply(
                "photos.getAlbums",
                json!({ "response": { "count": 2, "items": [
                    { "id": 1, "title": "Vacation 2019" },
                    { "id": 2, "title": "Vacation" },
                ]}}),
            )
            .reply("photos.getUploadServer", upload_server())
            .reply("photos.save", json!({ "response": [{ "id": 555 }] }));
        let s = session(host);

        let id = s.save_photo(album_request("Vacation")).await.unwrap();
        assert_eq!(id, 555);

        let host = s.scheduler().host();
        assert_eq!(
            host.methods(),
            vec!["photos.getAlbums", "photos.getUploadServer", "photos.save"]
        );
        assert_eq!(host.params_of("photos.getUploadServer")["album_id"], 2);
        let save = host.params_of("photos.save");
        assert_eq!(save["album_id"], 2);
        assert_eq!(save["server"], 101);
        assert_eq!(save["hash"], "h4sh");
        assert_eq!(save["caption"], "sunset");
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_photo_creates_missing_album_once() {
        let host = FakeHost::default()
            .reply(
                "photos.getAlbums",
                json!({ "response": { "items": [{ "id": 1, "title": "vacation" }] } }),
            )
            .reply("photos.createAlbum", json!({ "response": { "id": 9, "title": "Vacation" } }))
            .reply("photos.getUploadServer", upload_server())
            .reply("photos.save", json!({ "response": [{ "id": 77 }] }));
        let s = session(host);

        assert_eq!(s.save_photo(album_request("Vacation")).await.unwrap(), 77);

        let host = s.scheduler().host();
        assert_eq!(
            host.methods(),
            vec![
                "photos.getAlbums",
                "photos.createAlbum",
                "photos.getUploadServer",
                "photos.save"
            ]
        );
        let create = host.params_of("photos.createAlbum");
        assert_eq!(create["title"], "Vacation");
        assert_eq!(create["description"], "trip");
        assert_eq!(host.params_of("photos.getUploadServer")["album_id"], 9);
    }

    #[tokio::test]
    async fn test_save_photo_requires_album_name() {
        let s = session(FakeHost::default());
        let mut req = album_request("x");
        req.album_name = None;
        let err = s.save_photo(req).await.unwrap_err();
        assert_eq!(err.to_string(), "album_name is not defined");

        let mut req = album_request("x");
        req.album_name = Some(String::new());
        assert!(matches!(
            s.save_photo(req).await,
            Err(SdkError::MissingParameter("album_name"))
        ));
        assert!(s.scheduler().host().methods().is_empty());
    }

    fn share_host() -> FakeHost {
        FakeHost::default()
            .reply("photos.getWallUploadServer", upload_server())
            .reply(
                "photos.saveWallPhoto",
                json!({ "response": [{ "id": 456, "owner_id": 123 }] }),
            )
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_photo_posts_and_restores_scroll() {
        let host = share_host().reply("wall.post", json!({ "response": { "post_id": 31 } }));
        let s = session(host);
        s.handle_event(HostEvent::Scroll {
            position: 412,
            window_height: 900,
        });

        let post_id = s
            .share_photo(SharePhoto {
                uid: Some(123),
                message: Some("look".into()),
                photo_base64: PHOTO.into(),
                link: Some("https://app.example/p/1".into()),
            })
            .await
            .unwrap();
        assert_eq!(post_id, 31);

        let host = s.scheduler().host();
        let post = host.params_of("wall.post");
        assert_eq!(post["attachments"], "photo123_456,https://app.example/p/1");
        assert_eq!(post["owner_id"], 123);
        assert_eq!(post["message"], "look");

        let saved = host.params_of("photos.saveWallPhoto");
        assert_eq!(saved["user_id"], 123);
        assert_eq!(saved["caption"], "look");
        assert_eq!(saved["photo"], "[{\"photo\":\"x\"}]");

        assert_eq!(
            host.ui_calls(),
            vec![
                ("scrollWindow".to_string(), vec![json!(0), json!(0)]),
                ("scrollWindow".to_string(), vec![json!(300), json!(0)]),
            ]
        );
        // Notifications flow again after the post.
        s.handle_event(HostEvent::Scroll {
            position: 212,
            window_height: 900,
        });
        assert_eq!(s.scroll_top(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_photo_without_uid_omits_owner() {
        let host = share_host().reply("wall.post", json!({ "response": { "post_id": 1 } }));
        let s = session(host);
        s.share_photo(SharePhoto {
            photo_base64: PHOTO.into(),
            ..SharePhoto::default()
        })
        .await
        .unwrap();

        let post = s.scheduler().host().params_of("wall.post");
        assert!(!post.contains_key("owner_id"));
        assert!(!post.contains_key("message"));
        assert_eq!(post["attachments"], "photo123_456");
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_photo_user_cancel() {
        let host = share_host().reply(
            "wall.post",
            json!({ "error": { "error_code": 10007, "error_msg": "Operation denied by user" } }),
        );
        let s = session(host);

        let err = s
            .share_photo(SharePhoto {
                photo_base64: PHOTO.into(),
                ..SharePhoto::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_cancel());
        assert_eq!(err.to_string(), "Canceled by user");
        assert_eq!(s.scheduler().host().ui_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_photo_other_error_passes_through_and_restores() {
        let host = share_host().reply("wall.post", json!({ "error": { "error_code": 214 } }));
        let s = session(host);

        let err = s
            .share_photo(SharePhoto {
                photo_base64: PHOTO.into(),
                ..SharePhoto::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some(214));
        let ui = s.scheduler().host().ui_calls();
        assert_eq!(ui.last().unwrap().0, "scrollWindow");

        s.handle_event(HostEvent::Scroll {
            position: 150,
            window_height: 600,
        });
        assert_eq!(s.scroll_top(), 38);
    }

    #[test]
    fn test_scroll_events_are_offset_and_delivered() {
        let s = session(FakeHost::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = s.on_window_scroll(move |e| sink.lock().unwrap().push(*e));

        s.handle_event(HostEvent::Scroll {
            position: 612,
            window_height: 800,
        });
        assert!(s.unsubscribe_scroll(id));
        s.handle_event(HostEvent::Scroll {
            position: 700,
            window_height: 800,
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ScrollEvent {
                scroll_top: 500,
                window_height: 800
            }]
        );
        assert_eq!(s.scroll_top(), 588);
        assert_eq!(
            s.scheduler().host().ui_calls(),
            vec![("scrollSubscribe".to_string(), vec![json!(true)])]
        );
    }

    #[test]
    fn test_window_helpers() {
        let s = session(FakeHost::default());
        assert_eq!(
            s.resize_window(800, 1200),
            WindowSize {
                width: 800,
                height: 1200
            }
        );
        s.scroll_window(40, 300);
        assert_eq!(
            s.scheduler().host().ui_calls(),
            vec![
                ("resizeWindow".to_string(), vec![json!(800), json!(1200)]),
                ("scrollWindow".to_string(), vec![json!(152), json!(300)]),
            ]
        );
    }

    #[tokio::test]
    async fn test_order_success() {
        let s = session(FakeHost::default());
        let (outcome, _) = tokio::join!(s.show_order_box("gems_100"), async {
            tokio::task::yield_now().await;
            s.handle_event(HostEvent::OrderSuccess { order_id: 42 });
        });
        assert_eq!(outcome.unwrap(), OrderOutcome::Success { order_id: 42 });
        assert_eq!(
            s.scheduler().host().ui_calls(),
            vec![(
                "showOrderBox".to_string(),
                vec![json!({ "type": "item", "item": "gems_100" })]
            )]
        );
    }

    #[tokio::test]
    async fn test_order_cancel_and_fail() {
        let s = session(FakeHost::default());
        let (cancelled, _) = tokio::join!(s.show_order_box("a"), async {
            tokio::task::yield_now().await;
            s.handle_event(HostEvent::OrderCancel);
        });
        assert_eq!(cancelled.unwrap(), OrderOutcome::Cancelled);

        let (failed, _) = tokio::join!(s.show_order_box("b"), async {
            tokio::task::yield_now().await;
            s.handle_event(HostEvent::OrderFail { error_code: 3 });
        });
        assert!(matches!(failed, Err(SdkError::OrderFailed { code: 3 })));
    }

    #[tokio::test]
    async fn test_second_order_supersedes_first() {
        let s = session(FakeHost::default());
        let (first, second, _) = tokio::join!(
            s.show_order_box("first"),
            s.show_order_box("second"),
            async {
                tokio::task::yield_now().await;
                s.handle_event(HostEvent::OrderSuccess { order_id: 7 });
            }
        );
        assert!(matches!(first, Err(SdkError::OrderSuperseded)));
        assert_eq!(second.unwrap(), OrderOutcome::Success { order_id: 7 });
    }

    #[test]
    fn test_order_event_without_pending_is_ignored() {
        let s = session(FakeHost::default());
        s.handle_event(HostEvent::OrderSuccess { order_id: 1 });
        s.handle_event(HostEvent::OrderCancel);
    }

    #[tokio::test]
    async fn test_init_notifies_lifecycle_listeners() {
        let s = session(FakeHost::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        s.on_lifecycle(move |e| sink.lock().unwrap().push(e.clone()));
        s.init().await.unwrap();

        let failing = session(FakeHost {
            init_error: Some("blocked".into()),
            ..FakeHost::default()
        });
        let sink = seen.clone();
        let id = failing.on_lifecycle(move |e| sink.lock().unwrap().push(e.clone()));
        assert!(failing.init().await.is_err());
        assert!(failing.unsubscribe_lifecycle(id));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Lifecycle::InitSuccess,
                Lifecycle::InitFailed("blocked".into())
            ]
        );
    }
}
