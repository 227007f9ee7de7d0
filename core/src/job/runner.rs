use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::batch::BatchProcessor;
use crate::config::TranslatorConfig;
use crate::files::FileContentProvider;
use crate::model::{TranslationRequest, TranslationResponse};
use crate::pipeline::PipelinePlan;
use crate::usecases::ProcessFileUseCase;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum JobEvent {
    Started { plan: PipelinePlan },
    Progress { done: usize, total: usize },
    /// Cancellation accepted; chunks already in flight still finish.
    Stopping,
    /// A start arrived while another job was running.
    Rejected { file: PathBuf },
    Finished { response: Box<TranslationResponse> },
}

#[derive(Debug)]
pub enum JobMsg {
    Start {
        request: Box<TranslationRequest>,
        output_path: Option<PathBuf>,
    },
    Cancel,
}

/// Runs one process-file job at a time on a background task and reports
/// through [`JobEvent`]s.
pub struct JobRunner {
    tx: mpsc::Sender<JobMsg>,
}

impl JobRunner {
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        config: TranslatorConfig,
        processor: Arc<BatchProcessor>,
        files: Arc<dyn FileContentProvider>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, mut rx) = mpsc::channel::<JobMsg>(8);
        let (events, events_rx) = mpsc::unbounded_channel();

        let progress_events = events.clone();
        let use_case = ProcessFileUseCase::new(config, processor.clone(), files).with_progress(
            Arc::new(move |done: usize, total: usize| {
                let _ = progress_events.send(JobEvent::Progress { done, total });
            }),
        );

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let (request, output_path) = match msg {
                    JobMsg::Start {
                        request,
                        output_path,
                    } => (request, output_path),
                    JobMsg::Cancel => {
                        // nothing running
                        continue;
                    }
                };

                let plan = use_case.plan(&request, output_path.as_deref());
                info!("job started: {}", plan.target);
                let _ = events.send(JobEvent::Started { plan });

                let run = use_case.execute(&request, output_path.as_deref());
                tokio::pin!(run);
                let response = loop {
                    // the run is polled first so its reset lands before any cancel
                    tokio::select! {
                        biased;
                        response = &mut run => break response,
                        Some(msg) = rx.recv() => match msg {
                            JobMsg::Cancel => {
                                processor.cancel();
                                let _ = events.send(JobEvent::Stopping);
                            }
                            JobMsg::Start { request, .. } => {
                                warn!("job already running, ignoring {}", request.file_path.display());
                                let _ = events.send(JobEvent::Rejected {
                                    file: request.file_path,
                                });
                            }
                        },
                    }
                };

                info!("job finished: {:?}", response.status);
                let _ = events.send(JobEvent::Finished {
                    response: Box::new(response),
                });
            }
        });

        (Arc::new(Self { tx }), events_rx)
    }

    pub async fn start(
        &self,
        request: TranslationRequest,
        output_path: Option<PathBuf>,
    ) -> anyhow::Result<()> {
        self.tx
            .send(JobMsg::Start {
                request: Box::new(request),
                output_path,
            })
            .await
            .context("job runner has stopped")
    }

    pub async fn cancel(&self) -> anyhow::Result<()> {
        self.tx
            .send(JobMsg::Cancel)
            .await
            .context("job runner has stopped")
    }
}
