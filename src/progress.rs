use indicatif::{ProgressBar, ProgressStyle};

pub struct FileProcessingProgress {
    bar: ProgressBar,
}

impl FileProcessingProgress {
    pub fn new(total_files: usize) -> Self {
        let bar = ProgressBar::new(total_files as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("📁 Processing contracts [{bar:25.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );

        Self { bar }
    }

    pub fn process_file(&self, filename: &str) {
        self.bar.set_message(format!("Processing {filename}"));
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("✅ All contracts processed");
    }
}
