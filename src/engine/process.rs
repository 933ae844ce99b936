use super::{types::*, Engine};
use crate::config::Config;
use crate::ocr::OcrResponse;
use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs the configured OCR/LLM commands, one process per request.
pub struct ProcessEngine {
    cfg: Config,
}

impl ProcessEngine {
    pub fn new(cfg: &Config) -> Result<Self> {
        if cfg.engine.ocr_command.is_empty() {
            return Err(anyhow!("engine.ocr_command is empty"));
        }
        if cfg.engine.llm_command.is_empty() {
            return Err(anyhow!("engine.llm_command is empty"));
        }
        Ok(Self { cfg: cfg.clone() })
    }

    fn run_json<I: serde::Serialize, O: for<'de> serde::Deserialize<'de>>(
        &self,
        argv: &[String],
        input: &I,
        timeout_seconds: Option<u64>,
    ) -> Result<O> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty engine command"))?;
        debug!("engine run {} {:?} timeout={:?}", program, args, timeout_seconds);

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.engine.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning engine command: {program}"))?;

        {
            let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
            let bytes = serde_json::to_vec(input)?;
            stdin.write_all(&bytes)?;
            stdin.flush().ok();
        }

        let output = match timeout_seconds {
            Some(secs) if secs > 0 => wait_with_timeout(&mut child, Duration::from_secs(secs))?,
            _ => child
                .wait_with_output()
                .with_context(|| "waiting for engine command")?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("engine command failed: {program}\n{stderr}"));
        }

        if self.cfg.debug.keep_engine_stderr && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("engine stderr {}: {}", program, stderr.trim());
        }

        let out: O = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing engine JSON output: {program}"))?;
        Ok(out)
    }

    fn ping(&self, argv: &[String]) -> Result<serde_json::Value> {
        self.run_json(
            argv,
            &serde_json::json!({"cmd": "doctor"}),
            Some(self.cfg.engine.doctor_timeout_seconds),
        )
    }
}

impl Engine for ProcessEngine {
    fn doctor(&self) -> Result<EngineDiag> {
        let mut errors = Vec::new();
        let ocr_info = match self.ping(&self.cfg.engine.ocr_command) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(format!("ocr: {e:#}"));
                None
            }
        };
        let llm_info = match self.ping(&self.cfg.engine.llm_command) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(format!("llm: {e:#}"));
                None
            }
        };
        Ok(EngineDiag {
            ocr_ok: ocr_info.is_some(),
            llm_ok: llm_info.is_some(),
            ocr_info,
            llm_info,
            errors,
        })
    }

    fn ocr(&self, req: &OcrRequest) -> Result<OcrResponse> {
        self.run_json(
            &self.cfg.engine.ocr_command,
            &serde_json::json!({"cmd": "ocr", "req": req}),
            Some(self.cfg.engine.timeout_seconds),
        )
        .with_context(|| format!("OCR failed for {}", req.input_pdf))
    }

    fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let out: ChatResponse = self.run_json(
            &self.cfg.engine.llm_command,
            &serde_json::json!({"cmd": "chat", "req": req}),
            Some(self.cfg.engine.timeout_seconds),
        )?;
        if let Some(err) = out.error.as_deref() {
            warn!("llm command reported an error: {err}");
            return Err(anyhow!("llm error: {err}"));
        }
        Ok(out)
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain both pipes while waiting; a chatty child must not block on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf).with_context(|| "read stdout")?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf).with_context(|| "read stderr")?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| anyhow!("stdout reader thread panicked"))??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("engine process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            let _ = stdout_thread.join();
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Err(anyhow!(
                "engine process exceeded timeout ({:?}); stderr: {}",
                timeout,
                String::from_utf8_lossy(&stderr)
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
