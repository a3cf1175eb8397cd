use crate::ai::{generate_or_sentinel, TextGenerator};
use crate::store::{Slice, SliceReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptPreset {
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const PROMPT_PRESETS: &[PromptPreset] = &[
    PromptPreset {
        label: "Hands-on guide: local setup (Ollama + Python)",
        prompt: "Act as a senior MLOps engineer. Write a hands-on guide for setting up the Ferve Labs environment locally.\n\n\
Cover:\n\
1. Installing Ollama and pulling the 'llama3' or 'mistral' model.\n\
2. A basic Python script that talks to the model locally (offline).\n\
3. A simple short-term memory backed by a local JSON file or SQLite so the model remembers earlier conversations.\n\
4. Code examples.",
    },
    PromptPreset {
        label: "Concept: Liquid Neural Networks (LNNs)",
        prompt: "Explain Liquid Neural Networks (LNNs) in technical but approachable terms.\n\n\
1. What is the real mathematical difference between a Transformer and an LNN?\n\
2. How do you use the 'ncps' (Neural Circuit Policies) library in Python to build a simple time-series model?\n\
3. Give a Python example using PyTorch and NCPS.",
    },
    PromptPreset {
        label: "Concept: decentralized mesh (Zenoh/MQTT)",
        prompt: "Design the communication architecture for local IoT devices (Raspberry Pi, ESP32) with no cloud.\n\n\
1. Explain why to use Zenoh.io or MQTT.\n\
2. Draw a text flow diagram of a sensor sending data to the main computer, which runs it through Ollama and sends back an action.\n\
3. Suggested hardware roadmap for beginners.",
    },
    PromptPreset {
        label: "Ferve Labs manifesto (overview)",
        prompt: "Write the technical whitepaper for the Ferve Labs project.\n\n\
Pillars:\n\
1. \"Liquid State\" architecture (LNNs + continual learning)\n\
2. Digital-physical mesh (edge computing, P2P)\n\
3. Antifragility and active inference (proactive daemon)\n\n\
Produce: executive summary, recommended tech stack and a 6-month MVP roadmap.",
    },
];

/// Generates architecture notes through the AI collaborator. Does not touch
/// the daemon connection.
pub struct ArchitectureAdapter<G> {
    generator: G,
    loading: Slice<bool>,
    result: Slice<Option<String>>,
}

impl<G: TextGenerator> ArchitectureAdapter<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            loading: Slice::new(false),
            result: Slice::new(None),
        }
    }

    pub fn presets(&self) -> &'static [PromptPreset] {
        PROMPT_PRESETS
    }

    pub fn loading(&self) -> SliceReader<bool> {
        self.loading.reader()
    }

    pub fn result(&self) -> SliceReader<Option<String>> {
        self.result.reader()
    }

    pub async fn generate_docs(&self, prompt: &str) -> String {
        self.loading.replace(true);
        let text = generate_or_sentinel(&self.generator, prompt).await;
        self.result.replace(Some(text.clone()));
        self.loading.replace(false);
        text
    }
}
