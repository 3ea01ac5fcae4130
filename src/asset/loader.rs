use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use rayon::prelude::*;

use super::{Texture, Texture2D};
use crate::error::Result;

/// A texture decoded off the render thread.
#[derive(Debug)]
pub struct LoadedTexture {
    pub path: PathBuf,
    pub result: Result<Texture>,
}

/// Decodes image files on the rayon pool. Results come back through
/// [`BackgroundLoader::poll`] on the owning thread, which then hands them
/// to `Renderer::load`; GPU uploads never leave that thread.
pub struct BackgroundLoader {
    sender: Sender<LoadedTexture>,
    receiver: Receiver<LoadedTexture>,
    pending: usize,
}

impl BackgroundLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            pending: 0,
        }
    }

    pub fn request_texture(&mut self, path: impl Into<PathBuf>, color_data: bool) {
        let path = path.into();
        let sender = self.sender.clone();
        self.pending += 1;
        log::debug!("Queued background load of {:?}", path);
        rayon::spawn(move || {
            let result = Texture2D::from_path(&path, color_data).map(Texture::from);
            // The receiver only disappears with the loader itself.
            let _ = sender.send(LoadedTexture { path, result });
        });
    }

    /// Everything finished since the last call, without blocking.
    pub fn poll(&mut self) -> Vec<LoadedTexture> {
        let finished: Vec<_> = self.receiver.try_iter().collect();
        self.pending -= finished.len();
        finished
    }

    /// Blocks until every queued request has finished.
    pub fn finish(&mut self) -> Vec<LoadedTexture> {
        let mut finished = Vec::with_capacity(self.pending);
        while self.pending > 0 {
            match self.receiver.recv() {
                Ok(loaded) => {
                    self.pending -= 1;
                    finished.push(loaded);
                }
                Err(_) => break,
            }
        }
        finished
    }

    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl Default for BackgroundLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a batch of textures in parallel, preserving input order.
pub fn load_textures(paths: &[PathBuf], color_data: bool) -> Vec<Result<Texture>> {
    paths
        .par_iter()
        .map(|path| Texture2D::from_path(path, color_data).map(Texture::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_report_errors() {
        let mut loader = BackgroundLoader::new();
        loader.request_texture("missing/a.png", true);
        loader.request_texture("missing/b.png", false);
        assert_eq!(loader.pending(), 2);

        let finished = loader.finish();
        assert_eq!(finished.len(), 2);
        assert!(finished.iter().all(|loaded| loaded.result.is_err()));
        assert_eq!(loader.pending(), 0);
        assert!(loader.poll().is_empty());
    }

    #[test]
    fn batch_load_keeps_order() {
        let paths = vec![PathBuf::from("missing/one.png"), PathBuf::from("missing/two.png")];
        let results = load_textures(&paths, true);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_err));
    }
}
