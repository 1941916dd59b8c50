//! Scripted in-memory browser used by the integration tests.
//!
//! `/echo?x=<value>` renders the value verbatim and stores it, `/view`
//! renders everything stored so far. Anything else is an empty page.
//! Navigations, cookies and loaded documents also land in one ordered
//! `events` log.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use xssprobe::browser::{BrowserSession, ElementHandle, SessionFactory};
use xssprobe::errors::ProbeError;

#[derive(Default)]
pub struct StubBackend {
    pub sessions_created: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    pub stored: Mutex<Vec<String>>,
    /// A navigation whose URL contains one of these crashes the session,
    /// once per entry.
    pub crash_once: Mutex<Vec<String>>,
    /// URLs containing one of these time out on every load.
    pub slow: Mutex<Vec<String>>,
    pub refuse_sessions: bool,
    /// `navigate:<url>`, `cookie:<name>=<value>@<domain>` and `load_html`,
    /// in call order.
    pub events: Mutex<Vec<String>>,
    pub loaded_html: Mutex<Vec<String>>,
    /// Prompt texts handed out one per `dismiss_prompt` call.
    pub prompts: Mutex<VecDeque<String>>,
}

impl StubBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn crashing_on(needle: &str) -> Arc<Self> {
        let backend = Self::default();
        backend.crash_once.lock().unwrap().push(needle.to_string());
        Arc::new(backend)
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse_sessions: true,
            ..Self::default()
        })
    }

    pub fn created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct StubFactory(pub Arc<StubBackend>);

#[async_trait]
impl SessionFactory for StubFactory {
    async fn create(&self, _headless: bool) -> Result<Box<dyn BrowserSession>, ProbeError> {
        if self.0.refuse_sessions {
            return Err(ProbeError::SessionCreation("no driver listening".into()));
        }
        self.0.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            backend: Arc::clone(&self.0),
            url: "about:blank".to_string(),
            document: "<html></html>".to_string(),
            alive: true,
            closed: false,
        }))
    }

    fn backend_name(&self) -> &str {
        "stub"
    }
}

pub struct StubSession {
    backend: Arc<StubBackend>,
    url: String,
    document: String,
    alive: bool,
    closed: bool,
}

impl StubSession {
    fn render(&self, url: &str) -> String {
        if let Some((_, value)) = url.split_once("/echo?x=") {
            self.backend.stored.lock().unwrap().push(value.to_string());
            return format!("<html><body><p>You said: {}</p></body></html>", value);
        }
        if url.contains("/view") {
            let stored = self.backend.stored.lock().unwrap();
            let items: String = stored.iter().map(|v| format!("<li>{}</li>", v)).collect();
            return format!("<html><body><ul>{}</ul></body></html>", items);
        }
        "<html><body></body></html>".to_string()
    }
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), ProbeError> {
        if !self.alive {
            return Err(ProbeError::BackendCrash("session is gone".into()));
        }
        {
            let mut crash = self.backend.crash_once.lock().unwrap();
            if let Some(i) = crash.iter().position(|needle| url.contains(needle.as_str())) {
                crash.remove(i);
                self.alive = false;
                return Err(ProbeError::BackendCrash("connection reset by peer".into()));
            }
        }
        if self.backend.slow.lock().unwrap().iter().any(|n| url.contains(n.as_str())) {
            return Err(ProbeError::NavigationTimeout(url.to_string()));
        }
        self.backend.navigations.lock().unwrap().push(url.to_string());
        self.backend.log(format!("navigate:{}", url));
        self.document = self.render(url);
        self.url = url.to_string();
        Ok(())
    }

    async fn load_html(&mut self, html: &str) -> Result<(), ProbeError> {
        if !self.alive {
            return Err(ProbeError::BackendCrash("session is gone".into()));
        }
        self.backend.loaded_html.lock().unwrap().push(html.to_string());
        self.backend.log("load_html".to_string());
        self.document = html.to_string();
        Ok(())
    }

    async fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> Result<(), ProbeError> {
        if !self.alive {
            return Err(ProbeError::BackendCrash("session is gone".into()));
        }
        self.backend.log(format!("cookie:{}={}@{}", name, value, domain));
        Ok(())
    }

    async fn current_document(&mut self) -> Result<String, ProbeError> {
        if !self.alive {
            return Err(ProbeError::BackendCrash("session is gone".into()));
        }
        Ok(self.document.clone())
    }

    async fn current_url(&mut self) -> Result<String, ProbeError> {
        Ok(self.url.clone())
    }

    async fn run_inspection_script(&mut self, _script: &str) -> bool {
        false
    }

    async fn dismiss_prompt(&mut self) -> Option<String> {
        self.backend.prompts.lock().unwrap().pop_front()
    }

    async fn find_elements(&mut self, _xpath: &str) -> Result<Vec<ElementHandle>, ProbeError> {
        Ok(Vec::new())
    }

    async fn hover(&mut self, _element: &ElementHandle) -> Result<(), ProbeError> {
        Ok(())
    }

    async fn click(&mut self, _element: &ElementHandle) -> Result<(), ProbeError> {
        Ok(())
    }

    async fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.alive = false;
            self.backend.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
