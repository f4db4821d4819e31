use burn::backend::Autodiff;
use burn::tensor::{Shape, Tensor, TensorData};
use burn_ndarray::NdArray;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tractk_core::filter::morphology::{binarize, dilate};
use tractk_core::image::{DiffusionImage, ImageMetadata, TissueMaps, Volume};
use tractk_io::{read_trk, read_volume, write_diffusion, write_volume};
use tractk_tracking::{
    run_tracking, ClassifierKind, DensityMapBuilder, DiffusionModelFitter, DirectionGetterKind,
    EnsembleTracker, FittedModel, GradientTable, Parcellation, ReconModel, Sphere, TissueClassifier,
    TissuePaths, TrackType, TrackingConfig, TrackingError, TrackingInputs,
};

type B = Autodiff<NdArray<f32>>;

const DIMS: [usize; 3] = [20, 5, 5];

fn voxels() -> usize {
    DIMS.iter().product()
}

/// Two b0 frames and 32 weighted directions at b = 1000.
fn gradients() -> (Vec<f64>, Vec<[f64; 3]>) {
    let mut bvals = vec![0.0, 0.0];
    let mut bvecs = vec![[0.0; 3], [0.0; 3]];
    for v in Sphere::fibonacci(64).vertices().iter().filter(|v| v[2] > 0.0).take(32) {
        bvals.push(1000.0);
        bvecs.push(*v);
    }
    (bvals, bvecs)
}

/// One fibre along x through the whole grid, S0 = 100.
fn dwi() -> DiffusionImage<B> {
    let (bvals, bvecs) = gradients();
    let mut values = Vec::new();
    for (b, g) in bvals.iter().zip(&bvecs) {
        let s = 100.0 * (-b * (0.3e-3 + 1.4e-3 * g[0] * g[0])).exp();
        values.extend(std::iter::repeat(s as f32).take(voxels()));
    }
    let data = Tensor::<B, 4>::from_data(
        TensorData::new(values, Shape::new([bvals.len(), DIMS[2], DIMS[1], DIMS[0]])),
        &Default::default(),
    );
    DiffusionImage::new(data, ImageMetadata::default())
}

fn filled(value: f32) -> Volume {
    Volume::new(vec![value; voxels()], DIMS, ImageMetadata::default())
}

/// Three slabs across x labelled 1, 2 and 3.
fn parcels() -> Volume {
    let mut v = filled(0.0);
    for z in 0..DIMS[2] {
        for y in 0..DIMS[1] {
            for (label, xs) in [(1.0, 0..3), (2.0, 8..11), (3.0, 17..20)] {
                for x in xs {
                    v.set(x, y, z, label);
                }
            }
        }
    }
    v
}

/// Interface restricted to the central row, three seed voxels per parcel.
fn central_row() -> Volume {
    let mut v = filled(0.0);
    for x in 0..DIMS[0] {
        v.set(x, 2, 2, 1.0);
    }
    v
}

fn fitted() -> FittedModel {
    let (bvals, bvecs) = gradients();
    let table = GradientTable::new(bvals, bvecs, 50.0).unwrap();
    DiffusionModelFitter::new(ReconModel::Tensor)
        .fit(&dwi(), &table, &filled(1.0), &Sphere::named("repulsion724").unwrap())
        .unwrap()
}

fn classifier() -> TissueClassifier {
    let tissue = TissueMaps::new(filled(1.0), filled(0.0), filled(0.0), filled(0.0)).unwrap();
    TissueClassifier::new(ClassifierKind::Wb, &tissue, &filled(1.0)).unwrap()
}

fn config() -> TrackingConfig {
    TrackingConfig::default()
        .with_model(ReconModel::Tensor)
        .with_classifier(ClassifierKind::Wb)
        .with_direction_getter(DirectionGetterKind::Det)
        .with_curvature_thresholds(vec![0.3])
        .with_step_sizes(vec![0.2])
        .with_min_length(10.0)
        .with_target_samples(100)
}

struct Subject {
    _dir: tempfile::TempDir,
    inputs: TrackingInputs,
}

fn subject(labels: &Volume, with_dwi: bool) -> Subject {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let dwi_path = root.join("dwi.nii.gz");
    let (bvals, bvecs) = gradients();
    if with_dwi {
        write_diffusion(&dwi_path, &dwi()).unwrap();
        let row = |f: &dyn Fn(usize) -> f64| (0..bvals.len()).map(|i| f(i).to_string()).collect::<Vec<_>>().join(" ");
        std::fs::write(root.join("bvals"), row(&|i| bvals[i])).unwrap();
        let rows: Vec<String> = (0..3).map(|a| row(&|i| bvecs[i][a])).collect();
        std::fs::write(root.join("bvecs"), rows.join("\n")).unwrap();
    }
    let write = |name: &str, v: &Volume| -> PathBuf {
        let path = root.join(name);
        write_volume(&path, v).unwrap();
        path
    };
    let tissue = TissuePaths {
        wm: write("wm.nii.gz", &filled(1.0)),
        gm: write("gm.nii.gz", &filled(0.0)),
        vent_csf: write("vent_csf.nii.gz", &filled(0.0)),
        csf_mask: write("csf_mask.nii.gz", &filled(0.0)),
        wm_gm_int: write("wm_gm_int.nii.gz", &central_row()),
    };
    let parcellation = write("parc.nii.gz", labels);
    let inputs = TrackingInputs::new(dwi_path, root.join("bvals"), root.join("bvecs"), parcellation, tissue)
        .with_brain_mask(Some(write("brain_mask.nii.gz", &filled(1.0))));
    Subject { _dir: dir, inputs }
}

#[test]
fn test_empty_parcellation_is_fatal() {
    let subject = subject(&filled(0.0), false);
    let result = run_tracking::<B>(&subject.inputs, config(), &Default::default());
    // the diffusion series does not exist, so reaching it would be an I/O error
    assert!(matches!(result, Err(TrackingError::EmptyParcellation(_))));
}

#[test]
fn test_unknown_strategy_is_rejected_when_parsed() {
    assert!("bogus".parse::<DirectionGetterKind>().is_err());
    assert!("particle".parse::<TrackType>().is_err());
    assert!(serde_json::from_str::<TrackingConfig>(r#"{"direction_getter": "bogus"}"#).is_err());
    assert!(serde_json::from_str::<TrackingConfig>(r#"{"model": "dki"}"#).is_err());
    let config: TrackingConfig = serde_json::from_str(r#"{"direction_getter": "closest"}"#).unwrap();
    assert_eq!(config.direction_getter, DirectionGetterKind::Closest);
}

#[test]
fn test_unknown_sphere_fails_before_fitting() {
    let subject = subject(&parcels(), false);
    let result = run_tracking::<B>(&subject.inputs, config().with_sphere("dodecahedron"), &Default::default());
    assert!(matches!(result, Err(e) if e.is_configuration()));
}

#[test]
fn test_missing_waymask_is_an_error() {
    let subject = subject(&parcels(), true);
    let missing = subject.inputs.dwi.with_file_name("missing_waymask.nii.gz");
    let inputs = subject.inputs.clone().with_waymask(Some(missing));
    let result = run_tracking::<B>(&inputs, config(), &Default::default());
    assert!(matches!(result, Err(TrackingError::Io(e)) if format!("{e:#}").contains("missing_waymask")));
}

#[test]
fn test_sweep_runs_curvature_major() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let config = config()
        .with_curvature_thresholds(vec![0.2, 0.4])
        .with_step_sizes(vec![0.1, 0.2])
        .with_target_samples(100_000)
        .with_max_sweeps(1);
    let tracker = EnsembleTracker::new(config, &parcellation, &filled(1.0)).unwrap();
    let expected = vec![(0.2, 0.1), (0.2, 0.2), (0.4, 0.1), (0.4, 0.2)];
    assert_eq!(tracker.passes(), expected);

    let bundle = tracker.run(&fitted(), &classifier(), None).unwrap();
    let run: Vec<(f64, f64)> = bundle.passes().iter().map(|p| (p.curvature, p.step)).collect();
    assert_eq!(run, expected);
    let seeds = tracker.seed_region().num_voxels();
    assert!(bundle.passes().iter().all(|p| p.seeds == seeds && p.kept <= p.generated));
    assert_eq!(bundle.len(), bundle.passes().iter().map(|p| p.kept).sum::<usize>());
}

#[test]
fn test_kept_streamlines_meet_min_length() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let config = config().with_min_length(15.0).with_target_samples(200).with_max_sweeps(1);
    let tracker = EnsembleTracker::new(config, &parcellation, &filled(1.0)).unwrap();
    let model = fitted();
    let bundle = tracker.run(&model, &classifier(), None).unwrap();
    assert!(!bundle.is_empty());
    let spacing = *model.metadata().spacing();
    assert!(bundle.streamlines().iter().all(|s| s.length_mm(&spacing) >= 15.0));
}

#[test]
fn test_density_is_reproducible() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let config = config()
        .with_direction_getter(DirectionGetterKind::Prob)
        .with_curvature_thresholds(vec![30.0])
        .with_step_sizes(vec![0.5])
        .with_target_samples(50)
        .with_seed(7);
    let model = fitted();
    let classifier = classifier();
    let density = || {
        let tracker = EnsembleTracker::new(config.clone(), &parcellation, &filled(1.0)).unwrap();
        let bundle = tracker.run(&model, &classifier, None).unwrap();
        DensityMapBuilder::new(parcellation.volume()).build(&bundle, model.metadata())
    };
    let first = density();
    assert!(first.count_above(0.0) > 0);
    assert_eq!(first.values(), density().values());
}

#[test]
fn test_target_is_checked_between_passes() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let config = config().with_curvature_thresholds(vec![0.2, 0.4]).with_target_samples(7);
    let tracker = EnsembleTracker::new(config, &parcellation, &filled(1.0)).unwrap();
    let bundle = tracker.run(&fitted(), &classifier(), None).unwrap();

    // the first pass tracks every seed and overshoots; the second never starts
    assert_eq!(bundle.passes().len(), 1);
    let pass = &bundle.passes()[0];
    assert_eq!(pass.seeds, tracker.seed_region().num_voxels());
    assert!(pass.generated >= pass.seeds);
    assert!(bundle.len() > 7);
    assert_eq!(bundle.len(), pass.kept);
}

#[test]
fn test_sweeps_repeat_until_target() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let mut interface = filled(0.0);
    for x in [1, 9, 18] {
        interface.set(x, 2, 2, 1.0);
    }
    let model = fitted();
    let classifier = classifier();
    let run = |config: TrackingConfig| {
        let tracker = EnsembleTracker::new(config, &parcellation, &interface).unwrap();
        tracker.run(&model, &classifier, None).unwrap()
    };

    let single = run(config().with_target_samples(20).with_max_sweeps(1));
    assert_eq!(single.passes().len(), 1);
    assert!(!single.is_empty() && single.len() < 20);

    let repeated = run(config().with_target_samples(20));
    assert!(repeated.len() >= 20);
    assert!(repeated.passes().len() > 1);
    assert!(repeated.passes().iter().all(|p| p.seeds == 3));
}

fn touches(line: &[[f64; 3]], mask: &Volume) -> bool {
    line.iter().any(|p| mask.sample_nearest(p).is_some_and(|v| v > 0.0))
}

#[test]
fn test_waymask_keeps_only_streamlines_through_it() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let config = config().with_roi_neighborhood_tol(0.5).with_target_samples(10_000).with_max_sweeps(1);
    let tracker = EnsembleTracker::new(config, &parcellation, &filled(1.0)).unwrap();
    let model = fitted();
    let classifier = classifier();

    // one column at x = 5, y = 0 across all z
    let mut waymask = filled(0.0);
    for z in 0..DIMS[2] {
        waymask.set(5, 0, z, 1.0);
    }
    let unconstrained = tracker.run(&model, &classifier, None).unwrap();
    let constrained = tracker.run(&model, &classifier, Some(&waymask)).unwrap();

    assert!(!constrained.is_empty());
    assert!(constrained.len() < unconstrained.len());
    assert!(constrained.streamlines().iter().all(|s| touches(s.points(), &waymask)));
    assert!(unconstrained.streamlines().iter().any(|s| !touches(s.points(), &waymask)));
}

#[test]
fn test_empty_waymask_differs_from_no_waymask() {
    let parcellation = Parcellation::new(parcels(), "parc").unwrap();
    let tracker = EnsembleTracker::new(config().with_max_sweeps(1), &parcellation, &filled(1.0)).unwrap();
    let model = fitted();
    let classifier = classifier();

    let empty = tracker.run(&model, &classifier, Some(&filled(0.0))).unwrap();
    assert!(empty.is_empty());
    assert!(empty.passes().iter().all(|p| p.kept == 0 && p.generated > 0));
    assert!(!tracker.run(&model, &classifier, None).unwrap().is_empty());
}

fn exists(path: &Path) -> bool {
    path.is_file() && std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

#[test]
fn test_end_to_end_writes_density_and_streamlines() {
    let subject = subject(&parcels(), true);
    let config = config().with_max_sweeps(1);
    let outputs = run_tracking::<B>(&subject.inputs, config, &Default::default()).unwrap();

    assert!(outputs.streamlines > 0 && outputs.streamlines <= 100);
    assert_eq!(outputs.passes.len(), 1);
    assert!(exists(&outputs.files.density_map));
    assert!(exists(&outputs.files.streamlines));
    assert_eq!(outputs.files.dir, subject.inputs.dwi.parent().unwrap().join("parc"));

    let density = read_volume(&outputs.files.density_map).unwrap();
    assert_eq!(density.dims(), DIMS);
    let (_, lines) = read_trk(&outputs.files.streamlines).unwrap();
    assert_eq!(lines.len(), outputs.streamlines);
    let near_parcels = dilate(&binarize(&parcels(), 0.0), 1.0);
    assert!(lines.iter().all(|line| touches(line, &near_parcels)));
    // every written point lies on the grid and counts once
    let points: usize = lines.iter().map(Vec::len).sum();
    let total: f64 = density.values().iter().map(|v| *v as f64).sum();
    assert_eq!(total.round() as usize, points);
}
