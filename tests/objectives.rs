mod common;

use common::*;
use std::f64::consts::PI;
use uvcut_rs::data_provider::{
    CoordinateDataProvider, CoordinateDiffDataProvider, CrossCoordinateDiffDataProvider,
    EdgePairDataProvider, FaceDataProvider, FaceFanDataProvider, ProviderGraph,
};
use uvcut_rs::mesh::MeshDataProvider;
use uvcut_rs::objective::{
    AugmentedLagrangian, CoordinateObjective, CrossCoordinateObjective, EdgePairAngleObjective,
    EdgePairLengthObjective, FaceBarycenterPositionObjective, HessianMode, LagrangianObjective,
    PeriodicObjective, Separation, SingularPointObjective, SymmetricDirichlet,
    VertexPositionObjective,
};
use uvcut_rs::{Error, ObjectiveFunction, Property, PropertyId, UpdateFidelity};

fn exact_dirichlet(f: &Fixture) -> SymmetricDirichlet {
    let mut sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    sd.set_property(Property::HessianMode(HessianMode::Exact))
        .unwrap();
    sd
}

fn unprojected_separation(f: &Fixture, delta: f64) -> Separation {
    let mut separation = Separation::new("separation", &f.mesh, f.plain, delta).unwrap();
    separation
        .set_property(Property::ProjectToPsd(false))
        .unwrap();
    separation
}

#[test]
fn symmetric_dirichlet_derivatives() {
    let mut f = fixture(two_triangles());
    let sd = exact_dirichlet(&f);
    f.model.add_objective(sd);
    f.model.initialize().unwrap();
    assert_derivatives(&mut f.model, &perturbed(&f.x, 1, 0.05));
}

#[test]
fn isometry_costs_four_times_the_area() {
    let mut f = fixture(equilateral_triangle());
    let sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    f.model.add_objective(sd);
    f.model.initialize().unwrap();
    let value = f.model.evaluate(&f.x).unwrap();
    let area = 3f64.sqrt() / 4.;
    assert!((value - 4. * area).abs() < 1e-9, "{value}");

    f.model.update(&f.x, UpdateFidelity::Gradient).unwrap();
    assert!(f.model.gradient().iter().all(|g| g.abs() < 1e-9));
}

#[test]
fn separation_derivatives() {
    let mut f = fixture(two_triangles());
    let separation = unprojected_separation(&f, 0.5);
    f.model.add_objective(separation);
    f.model.initialize().unwrap();
    assert_derivatives(&mut f.model, &perturbed(&f.x, 2, 0.2));
}

#[test]
fn closed_seams_cost_nothing() {
    let mut f = fixture(two_triangles());
    let separation = Separation::new("separation", &f.mesh, f.plain, 1.).unwrap();
    f.model.add_objective(separation);
    f.model.initialize().unwrap();
    f.model.update(&f.x, UpdateFidelity::Hessian).unwrap();
    assert_eq!(f.model.value(), 0.);
    assert!(f.model.gradient().iter().all(|&g| g == 0.));
}

#[test]
fn edge_pair_angle_derivatives() {
    let mut f = fixture(two_triangles());
    let pair = EdgePairDataProvider::new(&f.mesh, f.mesh.edge_pairs()[0]);
    let pair = f.model.providers_mut().insert(pair);
    let angle = EdgePairAngleObjective::new("angle", f.model.providers(), pair).unwrap();
    f.model.add_objective(angle);
    f.model.initialize().unwrap();

    let mut x = f.x.clone();
    rotate_face(&f.mesh, &mut x, 1, 0.4);
    let value = f.model.evaluate(&x).unwrap();
    assert!((value.abs() - 0.4).abs() < 1e-9, "{value}");
    assert_derivatives(&mut f.model, &perturbed(&x, 3, 0.02));
}

#[test]
fn edge_pair_length_derivatives() {
    let mut f = fixture(two_triangles());
    let pair = EdgePairDataProvider::new(&f.mesh, f.mesh.edge_pairs()[0]);
    let pair = f.model.providers_mut().insert(pair);
    let mut length = EdgePairLengthObjective::new("length", f.model.providers(), pair).unwrap();
    length.set_property(Property::ProjectToPsd(false)).unwrap();
    f.model.add_objective(length);
    f.model.initialize().unwrap();

    let mut x = f.x.clone();
    rotate_face(&f.mesh, &mut x, 1, 0.4);
    // Rigid motions keep both edges the same length.
    assert!(f.model.evaluate(&x).unwrap() < 1e-20);
    assert_derivatives(&mut f.model, &perturbed(&x, 4, 0.1));
}

#[test]
fn vertex_position_derivatives() {
    let mut f = fixture(two_triangles());
    let target = [0.3, -0.2];
    let position = VertexPositionObjective::new("pin", &f.mesh, f.plain, 4, target).unwrap();
    f.model.add_objective(position);
    f.model.initialize().unwrap();

    let n = f.mesh.image_vertices_count();
    let value = f.model.evaluate(&f.x).unwrap();
    let expected = (f.x[4] - target[0]).powi(2) + (f.x[n + 4] - target[1]).powi(2);
    assert!((value - expected).abs() < 1e-12);
    assert_derivatives(&mut f.model, &f.x.clone());
}

#[test]
fn face_barycenter_position_derivatives() {
    let mut f = fixture(strip());
    let face = FaceDataProvider::new(f.plain, f.mesh.image_faces()[2]);
    let face = f.model.providers_mut().insert(face);
    let position =
        FaceBarycenterPositionObjective::new("drag", &f.mesh, f.model.providers(), face, [1., 1.])
            .unwrap();
    f.model.add_objective(position);
    f.model.initialize().unwrap();

    // Barycenter of the face is (5/3, 1/3).
    let value = f.model.evaluate(&f.x).unwrap();
    let expected = (2f64 / 3.).powi(2) + (2f64 / 3.).powi(2);
    assert!((value - expected).abs() < 1e-12, "{value}");
    assert_derivatives(&mut f.model, &perturbed(&f.x, 5, 0.1));
}

#[test]
fn singular_point_derivatives() {
    let mut f = fixture(strip());
    let fan = FaceFanDataProvider::new(f.plain, f.mesh.face_fans()[1].clone());
    let fan = f.model.providers_mut().insert(fan);
    let singular =
        SingularPointObjective::new("singular", &f.mesh, f.model.providers(), fan).unwrap();
    f.model.add_objective(singular);
    f.model.initialize().unwrap();

    let value = f.model.evaluate(&f.x).unwrap();
    assert!((value - PI).abs() < 1e-9, "{value}");
    assert_derivatives(&mut f.model, &perturbed(&f.x, 6, 0.05));
}

#[test]
fn coordinate_derivatives() {
    let mut f = fixture(two_triangles());
    let providers = f.model.providers_mut();
    let a = providers.insert(CoordinateDataProvider::new(1));
    let b = providers.insert(CoordinateDataProvider::new(14));
    let c = providers.insert(CoordinateDataProvider::new(5));
    let d = providers.insert(CoordinateDataProvider::new(20));
    let ab = CoordinateDiffDataProvider::new(providers, a, b).unwrap();
    let ab = providers.insert(ab);
    let cd = CoordinateDiffDataProvider::new(providers, c, d).unwrap();
    let cd = providers.insert(cd);
    let cross = CrossCoordinateDiffDataProvider::new(providers, ab, cd).unwrap();
    let cross = providers.insert(cross);

    let coordinate = CoordinateObjective::new("coordinate", f.model.providers(), a).unwrap();
    let mixed = CrossCoordinateObjective::new("cross", f.model.providers(), cross).unwrap();
    f.model.add_objective(coordinate);
    f.model.add_objective(mixed);
    f.model.initialize().unwrap();

    let x = perturbed(&f.x, 7, 0.3);
    let value = f.model.evaluate(&x).unwrap();
    let expected = x[1] + (x[1] - x[14]) - (x[5] - x[20]);
    assert!((value - expected).abs() < 1e-12);
    assert_derivatives(&mut f.model, &x);
}

#[test]
fn periodic_coordinate_derivatives() {
    let mut f = fixture(two_triangles());
    let coordinate = f
        .model
        .providers_mut()
        .insert(CoordinateDataProvider::new(1));
    let inner = CoordinateObjective::new("coordinate", f.model.providers(), coordinate).unwrap();
    let mut periodic = PeriodicObjective::periodic("periodic", inner, 0.7).unwrap();
    periodic
        .set_property(Property::ProjectToPsd(false))
        .unwrap();
    f.model.add_objective(periodic);
    f.model.initialize().unwrap();

    // x[1] = 1, so the coordinate sits at 0.3 of the period.
    let u: f64 = 0.3;
    let value = f.model.evaluate(&f.x).unwrap();
    let expected = u * u * (0.7 - u).powi(2) / 0.49;
    assert!((value - expected).abs() < 1e-9, "{value}");
    assert_derivatives(&mut f.model, &f.x.clone());
}

#[test]
fn periodic_objective_vanishes_on_multiples_of_the_period() {
    for period in [0.5, 1., 2. * PI] {
        let mut providers = ProviderGraph::new();
        let coordinate = providers.insert(CoordinateDataProvider::new(0));
        providers.build().unwrap();
        let inner = CoordinateObjective::new("coordinate", &providers, coordinate).unwrap();
        let mut periodic = PeriodicObjective::periodic("periodic", inner, period).unwrap();
        periodic.initialize().unwrap();

        let mut at = |x: f64| {
            providers.update(&[x]).unwrap();
            providers.with_view(|view| periodic.update(&[x], &view, UpdateFidelity::Gradient));
            (periodic.value(), periodic.local_gradient()[0])
        };
        for k in [-1., 1., 3.] {
            let (value, slope) = at(k * period);
            assert!(value.abs() < 1e-9, "{period} {k}: {value}");
            assert!(slope.abs() < 1e-9, "{period} {k}: {slope}");
        }
        // Continuous across the wrap.
        let h = 1e-6;
        let (below, _) = at(period - h);
        let (above, _) = at(period + h);
        assert!((below - above).abs() < 1e-9);
        assert!(below > 0. && above > 0.);
    }
}

#[test]
fn lagrangian_derivatives_and_multiplier_update() {
    let mut providers = ProviderGraph::new();
    let c: Vec<_> = (0..4)
        .map(|i| providers.insert(CoordinateDataProvider::new(i)))
        .collect();
    let ab = CoordinateDiffDataProvider::new(&providers, c[0], c[1]).unwrap();
    let ab = providers.insert(ab);
    let cd = CoordinateDiffDataProvider::new(&providers, c[2], c[3]).unwrap();
    let cd = providers.insert(cd);
    let cross = CrossCoordinateDiffDataProvider::new(&providers, ab, cd).unwrap();
    let cross = providers.insert(cross);
    providers.build().unwrap();

    let inner = CrossCoordinateObjective::new("cross", &providers, cross).unwrap();
    let outer = AugmentedLagrangian::new(0.5, 4.).unwrap();
    let mut lagrangian = LagrangianObjective::new("lagrangian", inner, outer);
    lagrangian.initialize().unwrap();

    let x = [3., 1., 0.5, 2.];
    providers.update(&x).unwrap();
    providers.with_view(|view| lagrangian.update(&x, &view, UpdateFidelity::Hessian));
    // c = (3 - 1) - (0.5 - 2)
    let constraint = 3.5;
    assert!((lagrangian.value() - (0.5 * constraint + 2. * constraint * constraint)).abs() < 1e-12);
    let dg = 0.5 + 4. * constraint;
    let gradient = lagrangian.gradient(4);
    for (g, sign) in gradient.iter().zip([1., -1., -1., 1.]) {
        assert!((g - sign * dg).abs() < 1e-12);
    }
    // g'' ∇c ∇cᵀ
    let signs = [1., -1., -1., 1.];
    let entries = lagrangian.hessian_entries();
    assert_eq!(entries.len(), 16);
    for (&(i, j), &v) in entries.iter().zip(lagrangian.triplet_values()) {
        assert!((v - 4. * signs[i] * signs[j]).abs() < 1e-12);
    }
    assert!(lagrangian.hessian(4).is_ok());

    lagrangian.update_multiplier();
    assert_eq!(
        lagrangian.property(PropertyId::Multiplier).unwrap(),
        Property::Multiplier(0.5 + 4. * constraint)
    );
    assert_eq!(
        lagrangian.property(PropertyId::Penalty).unwrap(),
        Property::Penalty(4.)
    );
}

#[test]
fn weighted_summation_derivatives() {
    let mut f = fixture(two_triangles());
    let mut sd = exact_dirichlet(&f);
    sd.set_weight(0.7);
    let mut separation = unprojected_separation(&f, 1.);
    separation.set_weight(0.3);
    f.model.add_objective(sd);
    f.model.add_objective(separation);
    f.model.initialize().unwrap();
    assert_derivatives(&mut f.model, &perturbed(&f.x, 8, 0.05));

    let n = f.model.variables_count();
    for handle in f.model.root().handles() {
        assert_gradient_support(f.model.objective(handle).unwrap(), n);
    }
}

#[test]
fn weights_scale_value_and_gradient() {
    let mut f = fixture(two_triangles());
    let sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    let handle = f.model.add_objective(sd);
    f.model.initialize().unwrap();
    let x = perturbed(&f.x, 9, 0.05);

    f.model.update(&x, UpdateFidelity::Hessian).unwrap();
    let (value, gradient) = (f.model.value(), f.model.gradient());
    let hessian = f.model.hessian_values().to_vec();

    f.model.objective_mut(handle).unwrap().set_weight(2.5);
    f.model.update(&x, UpdateFidelity::Hessian).unwrap();
    assert!((f.model.value() - 2.5 * value).abs() < 1e-9 * value.abs());
    for (a, b) in f.model.gradient().iter().zip(&gradient) {
        assert!((a - 2.5 * b).abs() < 1e-9 * (1. + b.abs()));
    }
    for (a, b) in f.model.hessian_values().iter().zip(&hessian) {
        assert!((a - 2.5 * b).abs() < 1e-9 * (1. + b.abs()));
    }
    // The objective itself stays unweighted.
    let sd = f.model.objective(handle).unwrap();
    assert!((sd.value() - value).abs() < 1e-9 * value.abs());
}

#[test]
fn hessian_pattern_is_fixed_between_initializations() {
    let mut f = fixture(strip());
    let sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    let separation = Separation::new("separation", &f.mesh, f.plain, 1.).unwrap();
    f.model.add_objective(sd);
    f.model.add_objective(separation);
    f.model.initialize().unwrap();

    let entries = f.model.hessian_entries();
    let count = f.model.hessian_values().len();
    assert_eq!(entries.len(), count);
    for seed in 0..3 {
        f.model
            .update(&perturbed(&f.x, seed, 0.1), UpdateFidelity::Hessian)
            .unwrap();
        assert_eq!(f.model.hessian_entries(), entries);
        assert_eq!(f.model.hessian_values().len(), count);
    }
}

#[test]
fn convex_concave_hessian_is_symmetric() {
    let mut f = fixture(strip());
    let sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    f.model.add_objective(sd);
    f.model.initialize().unwrap();
    f.model
        .update(&perturbed(&f.x, 10, 0.1), UpdateFidelity::Hessian)
        .unwrap();
    let h = dense_hessian(&f.model);
    for i in 0..h.len() {
        assert!(h[i][i] > 0.);
        for j in 0..i {
            assert!((h[i][j] - h[j][i]).abs() < 1e-9 * (1. + h[i][j].abs()));
        }
    }
}

#[test]
fn properties_are_checked() {
    let f = fixture(two_triangles());
    let mut sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    assert_eq!(
        sd.property(PropertyId::HessianMode).unwrap(),
        Property::HessianMode(HessianMode::ConvexConcave)
    );
    assert!(matches!(
        sd.set_property(Property::Value(1.)),
        Err(Error::InvalidProperty(_))
    ));
    assert_eq!(
        sd.property(PropertyId::Delta),
        Err(Error::UnsupportedProperty {
            objective: "sd".into(),
            property: "Delta".into(),
        })
    );
    sd.set_property(Property::Weight(0.3)).unwrap();
    assert_eq!(sd.property(PropertyId::Weight).unwrap(), Property::Weight(0.3));

    let mut separation = Separation::new("separation", &f.mesh, f.plain, 1.).unwrap();
    assert!(matches!(
        separation.set_property(Property::Delta(-1.)),
        Err(Error::InvalidProperty(_))
    ));
    assert_eq!(separation.delta(), 1.);
    separation.set_property(Property::Delta(0.25)).unwrap();
    assert_eq!(
        separation.property(PropertyId::Delta).unwrap(),
        Property::Delta(0.25)
    );
    assert!(Separation::new("separation", &f.mesh, f.plain, 0.).is_err());
}

#[test]
fn composite_forwards_unknown_properties_to_the_inner_objective() {
    let f = fixture(two_triangles());
    let sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    let mut periodic = PeriodicObjective::periodic("periodic", sd, 1.).unwrap();
    periodic
        .set_property(Property::HessianMode(HessianMode::Exact))
        .unwrap();
    assert_eq!(
        periodic.inner().property(PropertyId::HessianMode).unwrap(),
        Property::HessianMode(HessianMode::Exact)
    );
    assert_eq!(
        periodic.property(PropertyId::Period).unwrap(),
        Property::Period(1.)
    );
    assert!(periodic.set_property(Property::Period(0.)).is_err());
    periodic.set_property(Property::Period(2.)).unwrap();
    assert_eq!(periodic.outer().period(), 2.);
}

#[test]
fn removed_objectives_leave_the_model() {
    let mut f = fixture(two_triangles());
    let sd = SymmetricDirichlet::new("sd", &f.mesh, f.plain).unwrap();
    let separation = Separation::new("separation", &f.mesh, f.plain, 1.).unwrap();
    let sd = f.model.add_objective(sd);
    let separation_handle = f.model.add_objective(separation);
    f.model.initialize().unwrap();
    let revision = f.model.revision();
    let entries = f.model.hessian_entries().len();

    let removed = f.model.remove_objective(separation_handle).unwrap();
    assert_eq!(removed.name(), "separation");
    assert!(!f.model.is_initialized());
    assert_eq!(
        f.model.update(&f.x, UpdateFidelity::Value),
        Err(Error::NotInitialized)
    );
    assert!(matches!(
        f.model.remove_objective(separation_handle),
        Err(Error::UnknownHandle)
    ));

    f.model.initialize().unwrap();
    assert!(f.model.revision() > revision);
    assert!(f.model.hessian_entries().len() < entries);
    assert_eq!(f.model.find("sd"), Some(sd));
    assert_eq!(f.model.find("separation"), None);
}
