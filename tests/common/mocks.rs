use async_trait::async_trait;
use caption_gateway::{
    Error, Result,
    backend::{Captioner, ChatBackend, ImageGenerator, Judge, JudgeRequest, Judgement, VisionBackend},
    history::ConversationTurn,
    media::EncodedImage,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a fake remote backend answers every call.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Reply(String),
    Status(u16),
    Timeout,
    Local(String),
}

impl Behaviour {
    fn outcome(&self, backend: &str) -> Result<String> {
        match self {
            Self::Reply(text) => Ok(text.clone()),
            Self::Status(status) => Err(Error::upstream(backend, *status, "scripted failure")),
            Self::Timeout => Err(Error::transport(backend, "request timed out")),
            Self::Local(message) => Err(Error::local_backend(backend, message.clone())),
        }
    }
}

/// Fake primary vision backend
pub struct FakeVision {
    behaviour: Behaviour,
    calls: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

impl FakeVision {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Behaviour::Reply(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionBackend for FakeVision {
    async fn describe(&self, _image: &EncodedImage, instruction: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .unwrap()
            .push(instruction.to_string());
        self.behaviour.outcome("vision")
    }
}

/// Fake local captioner
pub struct FakeCaptioner {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeCaptioner {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Behaviour::Reply(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Captioner for FakeCaptioner {
    async fn caption(&self, _image: &EncodedImage) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.behaviour.outcome("captioner")
    }
}

/// Fake text-to-image generator returning a fixed image
pub struct FakeGenerator {
    image: EncodedImage,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(image: EncodedImage) -> Self {
        Self {
            image,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<EncodedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.image.clone())
    }
}

/// Fake chat backend that records every dispatched history
pub struct FakeChat {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(self, replies: &[&str]) -> Self {
        {
            let mut queue = self.replies.lock().unwrap();
            for reply in replies {
                queue.push_back(Ok(reply.to_string()));
            }
        }
        self
    }

    pub fn with_failure(self, status: u16) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::upstream("chat", status, "scripted failure")));
        self
    }

    pub fn requests(&self) -> Vec<Vec<ConversationTurn>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for FakeChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<String> {
        self.requests.lock().unwrap().push(turns.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::internal("No more scripted chat replies")))
    }
}

/// Fake judge that either scores everything or is unreachable
pub struct FakeJudge {
    score: Option<f32>,
    calls: AtomicUsize,
}

impl FakeJudge {
    pub fn scoring(score: f32) -> Self {
        Self {
            score: Some(score),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            score: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for FakeJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgement> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.score {
            Some(score) => Ok(Judgement {
                score: Some(score),
                feedback: format!("judged {} description", request.source),
                model: "fake-judge".to_string(),
            }),
            None => Err(Error::upstream("judge", 503, "scripted failure")),
        }
    }
}
