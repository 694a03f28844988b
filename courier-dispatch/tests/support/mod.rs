#![allow(dead_code)]

pub mod mock_server;

use std::sync::Arc;

use courier_common::model::{Command, Parameter, QueueRecord, Template};
use courier_dispatch::{
    MessageProcessor, PlaceholderRenderer, ProcessorConfig, sender::RecordingMailSender,
};
use courier_queue::MemoryQueue;
use courier_store::MemoryTemplateStore;

/// A processor wired to in-memory collaborators, with handles kept for
/// inspection.
pub struct Harness {
    pub store: MemoryTemplateStore,
    pub sender: RecordingMailSender,
    pub queue: MemoryQueue,
    pub processor: MessageProcessor,
}

impl Harness {
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_renderer(config, PlaceholderRenderer::default())
    }

    pub fn with_renderer(config: ProcessorConfig, renderer: PlaceholderRenderer) -> Self {
        let store = MemoryTemplateStore::with_templates([pc001()]);
        let sender = RecordingMailSender::new();
        let queue = MemoryQueue::new();

        let processor = MessageProcessor::new(
            Arc::new(store.clone()),
            Arc::new(sender.clone()),
            Arc::new(queue.clone()),
            Arc::new(renderer),
            config,
        );

        Self {
            store,
            sender,
            queue,
            processor,
        }
    }
}

pub fn pc001() -> Template {
    Template::new(
        "PC001",
        "Asunto de prueba",
        "Hola, nombre_archivo.",
        "remitente@example.com",
        "destinatario@example.com",
    )
}

pub fn command_body(template_id: &str, parameters: &[(&str, &str)], retry_count: u32) -> String {
    let command = Command {
        template_id: template_id.to_string(),
        parameters: parameters
            .iter()
            .map(|(name, value)| Parameter::new(*name, *value))
            .collect(),
        retry_count,
    };
    serde_json::to_string(&command).unwrap_or_default()
}

pub fn record(message_id: &str, body: impl Into<String>) -> QueueRecord {
    QueueRecord::new(message_id, body, format!("rh-{message_id}"))
}

/// The PC001 command of the happy path
pub fn pc001_record(message_id: &str, retry_count: u32) -> QueueRecord {
    record(
        message_id,
        command_body("PC001", &[("nombre_archivo", "archivo1.txt")], retry_count),
    )
}
