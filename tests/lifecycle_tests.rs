mod common;

use common::*;

use folio_render::gpu::ResourceKind;
use folio_render::loaders::{AssetLoader, MemorySource};
use folio_render::scenes::{self, LoadState};
use folio_render::SceneConfig;

#[cfg(test)]
mod release_tests {
    use super::*;

    fn assert_clean(mounted: &Mounted) {
        assert_eq!(mounted.ledger.live_count(), 0, "resources left live");
        assert!(mounted.ledger.renderer_disposed());
        assert_eq!(mounted.ledger.calls_after_dispose(), 0);
        assert_eq!(mounted.ledger.double_disposals(), 0);
        assert!(mounted.scheduler.pending().is_empty());
    }

    #[test]
    fn test_laptop_release_after_frames() {
        let config = SceneConfig::laptop();
        let mounted = Mounted::new(config.clone());
        mounted.load(laptop_source(&config)).unwrap();
        assert_eq!(mounted.pump(20).unwrap(), 20);
        assert!(mounted.ledger.live_of(ResourceKind::RenderTarget) >= 2);

        mounted.unmount();
        assert_clean(&mounted);
    }

    #[test]
    fn test_globe_release_after_frames() {
        let config = SceneConfig::globe();
        let mounted = Mounted::new(config.clone());
        mounted.load(globe_source(&config)).unwrap();
        assert_eq!(mounted.pump(20).unwrap(), 20);

        mounted.unmount();
        assert_clean(&mounted);
    }

    #[test]
    fn test_release_before_load() {
        let mounted = Mounted::new(SceneConfig::laptop());
        assert!(mounted.ledger.live_count() > 0);

        mounted.unmount();
        assert_clean(&mounted);
    }

    #[test]
    fn test_unmount_twice() {
        let config = SceneConfig::globe();
        let mounted = Mounted::new(config.clone());
        mounted.load(globe_source(&config)).unwrap();
        mounted.pump(3).unwrap();

        mounted.unmount();
        let calls = mounted.ledger.call_count();
        mounted.unmount();

        assert_eq!(mounted.ledger.call_count(), calls);
        assert_clean(&mounted);
    }

    #[test]
    fn test_mount_unmount_cycles() {
        for round in 0..6 {
            let config = if round % 2 == 0 {
                SceneConfig::laptop()
            } else {
                SceneConfig::globe()
            };
            let source = if round % 2 == 0 {
                laptop_source(&config)
            } else {
                globe_source(&config)
            };
            let mounted = Mounted::new(config);
            mounted.load(source).unwrap();
            mounted.pump(round).unwrap();
            mounted.unmount();
            assert_clean(&mounted);
        }
    }

    #[test]
    fn test_frames_after_unmount_are_ignored() {
        let config = SceneConfig::laptop();
        let mounted = Mounted::new(config.clone());
        mounted.load(laptop_source(&config)).unwrap();
        let pending = mounted.scheduler.pending()[0];

        mounted.unmount();
        mounted
            .scene
            .borrow_mut()
            .on_frame(pending, std::time::Instant::now())
            .unwrap();

        assert_eq!(mounted.ledger.surface_draws(), 0);
        assert_clean(&mounted);
    }
}

#[cfg(test)]
mod late_load_tests {
    use super::*;

    #[test]
    fn test_unmount_before_assets_arrive() {
        let config = SceneConfig::laptop();
        let mounted = Mounted::new(config.clone());
        let (source, open) = gated(laptop_source(&config));

        let mut load = scenes::load(&mounted.scene, AssetLoader::new(source));
        futures::executor::block_on(async {
            assert!(futures::poll!(&mut load).is_pending());
        });
        assert_eq!(mounted.scene.borrow().load_state(), LoadState::Loading);

        mounted.unmount();
        let calls = mounted.ledger.call_count();
        open.send(()).unwrap();

        assert!(futures::executor::block_on(load).is_ok());
        assert_eq!(mounted.ledger.call_count(), calls, "graphics calls after unmount");
        assert_eq!(mounted.loaded_calls.get(), 0);
        assert_eq!(mounted.scheduler.requested(), 0);
        assert_eq!(mounted.ledger.live_count(), 0);
    }

    #[test]
    fn test_dropped_scene_ignores_assets() {
        let config = SceneConfig::globe();
        let mounted = Mounted::new(config.clone());
        let (source, open) = gated(globe_source(&config));

        let mut load = scenes::load(&mounted.scene, AssetLoader::new(source));
        futures::executor::block_on(async {
            assert!(futures::poll!(&mut load).is_pending());
        });

        let Mounted {
            scene,
            ledger,
            scheduler,
            loaded_calls,
            ..
        } = mounted;
        drop(scene);
        assert!(ledger.renderer_disposed());
        let calls = ledger.call_count();

        open.send(()).unwrap();
        assert!(futures::executor::block_on(load).is_ok());
        assert_eq!(ledger.call_count(), calls);
        assert_eq!(ledger.live_count(), 0);
        assert_eq!(loaded_calls.get(), 0);
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn test_failed_load_after_unmount_is_silent() {
        let config = SceneConfig::laptop();
        let mounted = Mounted::new(config.clone());
        let source = MemorySource::new();
        insert_cubemap(&source, &config.environment);
        let (source, open) = gated(source);

        let mut load = scenes::load(&mounted.scene, AssetLoader::new(source));
        futures::executor::block_on(async {
            assert!(futures::poll!(&mut load).is_pending());
        });
        mounted.unmount();
        open.send(()).unwrap();

        // The model is missing, but nobody is left to hear about it
        assert!(futures::executor::block_on(load).is_ok());
        assert_eq!(mounted.ledger.live_count(), 0);
    }
}
