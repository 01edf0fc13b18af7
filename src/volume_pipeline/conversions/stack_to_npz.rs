use std::io::Write;
use std::path::Path;

use tracing::{info, instrument};

use crate::volume_pipeline::{
    common::error::{ConvertError, Result},
    config::ConvertConfig,
    npz::{BundleWriter, NpzBundleWriter},
    stack::{StackReader, TiffStackReader},
};

use super::assemble::assemble;

pub struct StackToNpzPipeline<R: StackReader, W: BundleWriter> {
    reader: R,
    writer: W,
    config: ConvertConfig,
}

impl StackToNpzPipeline<TiffStackReader, NpzBundleWriter> {
    pub fn new(config: ConvertConfig) -> Self {
        Self {
            reader: TiffStackReader,
            writer: NpzBundleWriter,
            config,
        }
    }
}

impl<R: StackReader, W: BundleWriter> StackToNpzPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, config: ConvertConfig) -> Self {
        Self {
            reader,
            writer,
            config,
        }
    }

    #[instrument(skip(self, input_data, output), fields(input_size = input_data.len()))]
    pub fn convert(&self, input_data: &[u8], source_name: &str, output: &mut dyn Write) -> Result<()> {
        info!("Starting stack to NPZ conversion");

        let stack = {
            let _span = tracing::info_span!("decode_stack").entered();
            self.reader.read_stack(input_data)?
        };

        let bundle = {
            let _span =
                tracing::info_span!("assemble_channels", shape = ?stack.data.shape()).entered();
            assemble(&stack, source_name, &self.config)?
        };

        {
            let _span = tracing::info_span!("encode_npz").entered();
            self.writer.write_bundle(&bundle, output)?;
        }

        let (depth, height, width) = bundle.r.dim();
        info!(
            depth,
            height,
            width,
            vx_um = bundle.meta.vx_um,
            vy_um = bundle.meta.vy_um,
            vz_um = bundle.meta.vz_um,
            map = %bundle.meta.channel_map,
            "Conversion complete"
        );
        Ok(())
    }

    #[instrument(skip(self, input_path, output_path))]
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
    ) -> Result<()> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "Converting file"
        );

        let input_data = {
            let _span = tracing::info_span!("read_input_file").entered();
            std::fs::read(input_path).map_err(|e| {
                ConvertError::InputReadError(format!("{}: {}", input_path.display(), e))
            })?
        };

        let source_name = input_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_path.display().to_string());

        // Encode fully in memory first; a failed conversion must not
        // leave a partial output file behind.
        let mut encoded = Vec::new();
        self.convert(&input_data, &source_name, &mut encoded)?;

        {
            let _span = tracing::info_span!("write_output_file").entered();
            std::fs::write(output_path, &encoded).map_err(|e| {
                ConvertError::OutputWriteError(format!("{}: {}", output_path.display(), e))
            })?;
        }

        Ok(())
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ConvertConfig) {
        self.config = config;
    }
}
