mod common;

use common::*;
use std::f64::consts::{FRAC_PI_2, PI};
use uvcut_rs::data_provider::CoordinateDataProvider;
use uvcut_rs::engine::{SEAMLESS, SEPARATION, SYMMETRIC_DIRICHLET};
use uvcut_rs::objective::CoordinateObjective;
use uvcut_rs::{Engine, EngineOptions, Error, Property, PropertyId, ThreadState};

fn engine(options: EngineOptions) -> Engine {
    let (vertices, faces) = two_triangles();
    Engine::new(&vertices, &faces, &planar_uv(&vertices), options).unwrap()
}

fn barycenter(engine: &mut Engine, face: usize) -> [f64; 2] {
    let positions = engine.image_vertices();
    let corners = engine.image_faces()[face];
    let mut b = [0.; 2];
    for v in corners {
        b[0] += positions[v][0] / 3.;
        b[1] += positions[v][1] / 3.;
    }
    b
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

#[test]
fn buffers_follow_the_soup() {
    let mut engine = engine(EngineOptions::default());
    assert_eq!(engine.domain_vertices_count(), 4);
    assert_eq!(engine.image_vertices_count(), 6);
    assert_eq!(engine.domain_faces().len(), 2);
    assert_eq!(engine.image_faces(), &[[0, 1, 2], [3, 4, 5]]);

    let domain = engine.domain_buffered_vertices();
    assert_eq!(domain.len(), 18);
    // Second corner of the second face is domain vertex 3.
    assert_eq!(&domain[12..15], &[1., 1., 0.3]);

    let image = engine.image_buffered_vertices();
    assert_eq!(image.len(), 18);
    assert_eq!(&image[12..15], &[1., 1., 0.]);
    assert!(image.chunks(3).all(|c| c[2] == 0.));
    assert_eq!(engine.image_vertices()[4], [1., 1.]);
}

#[test]
fn default_energy_weights() {
    let engine = engine(EngineOptions::default());
    assert_eq!(engine.weight(SYMMETRIC_DIRICHLET).unwrap(), 0.75);
    assert_eq!(engine.weight(SEPARATION).unwrap(), 0.25);
    assert!(engine.objective_handle(SEAMLESS).is_none());

    engine.set_lambda(0.4).unwrap();
    assert!((engine.weight(SYMMETRIC_DIRICHLET).unwrap() - 0.6).abs() < 1e-12);
    assert_eq!(engine.weight(SEPARATION).unwrap(), 0.4);
    assert!(matches!(
        engine.set_lambda(1.5),
        Err(Error::InvalidProperty(_))
    ));

    engine.set_weight(SEPARATION, 2.).unwrap();
    assert_eq!(engine.weight(SEPARATION).unwrap(), 2.);
    assert_eq!(
        engine.weight("unknown"),
        Err(Error::UnknownObjective("unknown".into()))
    );
}

#[test]
fn objective_properties() {
    let engine = engine(EngineOptions {
        delta: 0.5,
        ..Default::default()
    });
    assert_eq!(
        engine.property(SEPARATION, PropertyId::Delta).unwrap(),
        Property::Delta(0.5)
    );
    engine
        .set_property(SEPARATION, Property::Delta(2.))
        .unwrap();
    assert_eq!(
        engine.property(SEPARATION, PropertyId::Delta).unwrap(),
        Property::Delta(2.)
    );
    assert!(engine
        .set_property(SEPARATION, Property::Delta(0.))
        .is_err());
    assert!(matches!(
        engine.property(SYMMETRIC_DIRICHLET, PropertyId::Period),
        Err(Error::UnsupportedProperty { .. })
    ));
    assert!(matches!(
        engine.property(SEPARATION, PropertyId::Value).unwrap(),
        Property::Value(_)
    ));
}

#[test]
fn face_constraint_lifecycle() {
    let mut engine = engine(EngineOptions::default());
    let initial = barycenter(&mut engine, 1);
    let handle = engine.constrain_face_position(1).unwrap();
    assert_eq!(engine.constrain_face_position(1).unwrap(), handle);
    assert_eq!(engine.constrained_faces(), vec![1]);

    let name = "face_position_1";
    assert_eq!(engine.objective_handle(name), Some(handle));
    let Property::Target(target) = engine.property(name, PropertyId::Target).unwrap() else {
        panic!("expected a target");
    };
    assert!(distance(target, initial) < 1e-12);
    assert_eq!(engine.weight(name).unwrap(), 10.);

    engine.update_face_position(1, [2., -1.]).unwrap();
    assert_eq!(
        engine.property(name, PropertyId::Target).unwrap(),
        Property::Target([2., -1.])
    );

    engine.unconstrain_face_position(1).unwrap();
    assert!(engine.constrained_faces().is_empty());
    assert!(engine.objective_handle(name).is_none());
    assert_eq!(
        engine.update_face_position(1, [0., 0.]),
        Err(Error::UnknownObjective(name.into()))
    );
    assert!(engine.unconstrain_face_position(1).is_err());
    assert!(matches!(
        engine.constrain_face_position(7),
        Err(Error::InvalidMesh(_))
    ));

    // The model is consistent again after the removal.
    assert!(engine.with_model(|model| model.is_initialized()).unwrap());
}

#[test]
fn constraint_cycles_do_not_grow_the_model() {
    let mut engine = engine(EngineOptions::default());
    let count = |engine: &Engine| {
        engine
            .with_model(|model| (model.providers().len(), model.root().len()))
            .unwrap()
    };
    engine.constrain_face_position(0).unwrap();
    engine.unconstrain_face_position(0).unwrap();
    let after_one = count(&engine);
    for face in [0, 1, 0, 1] {
        engine.constrain_face_position(face).unwrap();
        engine.unconstrain_face_position(face).unwrap();
    }
    assert_eq!(count(&engine), after_one);
}

#[test]
fn failed_constraint_is_rolled_back() {
    let mut engine = engine(EngineOptions::default());
    let live = |model: &uvcut_rs::EnergyModel| {
        (
            model.providers().len() - model.providers().free_slots(),
            model.root().len(),
        )
    };
    let before = engine.with_model(|model| live(&*model)).unwrap();

    // An objective past the last variable makes every initialization fail.
    let out_of_range = 2 * engine.image_vertices_count() + 3;
    let mut broken = None;
    let result = engine.with_model(|model| {
        let provider = model
            .providers_mut()
            .insert(CoordinateDataProvider::new(out_of_range));
        let objective = CoordinateObjective::new("broken", model.providers(), provider).unwrap();
        broken = Some((provider, model.add_objective(objective)));
    });
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));

    assert!(matches!(
        engine.constrain_face_position(0),
        Err(Error::DimensionMismatch { .. })
    ));
    assert!(engine.constrained_faces().is_empty());
    assert!(engine.objective_handle("face_position_0").is_none());

    let (provider, handle) = broken.unwrap();
    let after = engine
        .with_model(|model| {
            model.remove_objective(handle).unwrap();
            model.providers_mut().remove(provider).unwrap();
            live(&*model)
        })
        .unwrap();
    assert_eq!(after, before);
    assert!(engine.constrain_face_position(0).is_ok());
    assert_eq!(engine.constrained_faces(), vec![0]);
}

#[test]
fn dragged_face_follows_its_target() {
    let mut engine = engine(EngineOptions::default());
    let start = barycenter(&mut engine, 0);
    engine.constrain_face_position(0).unwrap();
    let target = [start[0] + 0.5, start[1]];
    engine.update_face_position(0, target).unwrap();

    for _ in 0..5 {
        engine.solver().iterate_once().unwrap();
    }
    let reached = barycenter(&mut engine, 0);
    assert!(distance(reached, target) < distance(start, target));
}

#[test]
fn solver_lifecycle() {
    let mut engine = engine(EngineOptions::default());
    assert_eq!(engine.solver_state(), ThreadState::Terminated);
    engine.resume_solver();
    assert_eq!(engine.solver_state(), ThreadState::Running);

    // Structural changes while the worker runs.
    engine.constrain_face_position(0).unwrap();
    engine.update_face_position(0, [0.2, 0.2]).unwrap();
    engine.pause_solver();
    assert_eq!(engine.solver_state(), ThreadState::Paused);
    engine.unconstrain_face_position(0).unwrap();
    engine.resume_solver();
    assert_eq!(engine.solver_state(), ThreadState::Running);

    engine.terminate_solver();
    assert_eq!(engine.solver_state(), ThreadState::Terminated);
    assert_eq!(engine.image_vertices().len(), 6);
}

#[test]
fn seamless_energy_is_optional() {
    let mut engine = engine(EngineOptions {
        seamless_weight: Some(0.5),
        ..Default::default()
    });
    let handle = engine.objective_handle(SEAMLESS).unwrap();
    assert_eq!(engine.weight(SEAMLESS).unwrap(), 0.5);

    let positions = engine.image_vertices();
    let mut x: Vec<f64> = positions.iter().map(|p| p[0]).collect();
    x.extend(positions.iter().map(|p| p[1]));
    // A planar parameterization has no seam mismatch.
    let seamless = engine
        .with_model(|model| {
            model.evaluate(&x).unwrap();
            model.objective(handle).unwrap().value()
        })
        .unwrap();
    assert!(seamless.abs() < 1e-12, "{seamless}");
}

#[test]
fn nested_objectives_are_reachable_by_name() {
    let engine = engine(EngineOptions {
        seamless_weight: Some(1.),
        ..Default::default()
    });
    let length = "edge_pair_length_0";
    assert_eq!(
        engine.property(length, PropertyId::ProjectToPsd).unwrap(),
        Property::ProjectToPsd(true)
    );
    engine
        .set_property(length, Property::ProjectToPsd(false))
        .unwrap();
    assert_eq!(
        engine.property(length, PropertyId::ProjectToPsd).unwrap(),
        Property::ProjectToPsd(false)
    );
    engine.set_weight(length, 3.).unwrap();
    assert_eq!(engine.weight(length).unwrap(), 3.);

    let periodic = "edge_pair_angle_period_0";
    assert_eq!(
        engine.property(periodic, PropertyId::Period).unwrap(),
        Property::Period(FRAC_PI_2)
    );
    engine.set_property(periodic, Property::Period(PI)).unwrap();
    assert_eq!(
        engine.property(periodic, PropertyId::Period).unwrap(),
        Property::Period(PI)
    );
    // The angle itself sits below the periodic wrapper.
    assert_eq!(engine.weight("edge_pair_angle_0").unwrap(), 1.);

    assert!(engine.objective_handle(periodic).is_none());
    assert!(matches!(
        engine.property(SEAMLESS, PropertyId::Period),
        Err(Error::UnsupportedProperty { .. })
    ));
    assert_eq!(
        engine.weight("edge_pair_length_1"),
        Err(Error::UnknownObjective("edge_pair_length_1".into()))
    );
    assert!(engine.with_model(|model| model.is_initialized()).unwrap());
}

#[test]
fn invalid_inputs_are_rejected() {
    let (vertices, faces) = two_triangles();
    let uv = planar_uv(&vertices);
    assert_eq!(
        Engine::new(&vertices, &faces, &uv[..3], EngineOptions::default()).err(),
        Some(Error::DimensionMismatch {
            expected: 4,
            found: 3,
        })
    );
    assert!(matches!(
        Engine::new(&vertices, &[[0, 1, 9]], &uv, EngineOptions::default()),
        Err(Error::InvalidMesh(_))
    ));
    assert!(matches!(
        Engine::new(&vertices, &[], &uv, EngineOptions::default()),
        Err(Error::EmptyMeshData)
    ));
}
