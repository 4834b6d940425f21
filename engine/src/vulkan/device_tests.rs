use super::*;

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

fn suitable(name: &str) -> DeviceCandidate {
    DeviceCandidate {
        name: name.to_string(),
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        geometry_shader: true,
        sampler_anisotropy: true,
        queue_families: QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        },
        extensions: constants::DEVICE_EXTENSIONS.iter().copied().collect(),
        swapchain_adequate: true,
    }
}

fn described(candidates: &[DeviceCandidate]) -> Vec<Result<DeviceCandidate>> {
    candidates.iter().cloned().map(Ok).collect()
}

// ============================================================================
// Queue families
// ============================================================================

#[test]
fn graphics_and_present_may_differ() {
    let properties = [
        family(vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        family(vk::QueueFlags::COMPUTE),
    ];

    let indices = QueueFamilyIndices::find(&properties, |i| Ok(i == 2)).unwrap();

    assert_eq!(indices.graphics, Some(1));
    assert_eq!(indices.present, Some(2));
    assert_eq!(
        indices.complete(),
        Some(QueueFamilies {
            graphics: 1,
            present: 2
        })
    );
}

#[test]
fn missing_present_family_is_incomplete() {
    let properties = [family(vk::QueueFlags::GRAPHICS)];

    let indices = QueueFamilyIndices::find(&properties, |_| Ok(false)).unwrap();

    assert_eq!(indices.graphics, Some(0));
    assert_eq!(indices.present, None);
    assert_eq!(indices.complete(), None);
}

#[test]
fn present_query_errors_propagate() {
    let properties = [family(vk::QueueFlags::GRAPHICS)];
    let result = QueueFamilyIndices::find(&properties, |_| Err(anyhow!("lost surface")));
    assert!(result.is_err());
}

#[test]
fn shared_family_yields_one_queue_info() {
    let same = QueueFamilies {
        graphics: 3,
        present: 3,
    };
    let split = QueueFamilies {
        graphics: 2,
        present: 0,
    };

    assert_eq!(same.unique(), vec![3]);
    assert_eq!(split.unique(), vec![0, 2]);
}

// ============================================================================
// Device selection
// ============================================================================

#[test]
fn first_acceptable_device_wins() {
    let candidates = [suitable("first"), suitable("second")];

    let (index, families) = select_device(described(&candidates)).unwrap();

    assert_eq!(index, 0);
    assert_eq!(
        families,
        QueueFamilies {
            graphics: 0,
            present: 0
        }
    );
}

#[test]
fn selection_is_deterministic() {
    let mut cpu = suitable("llvmpipe");
    cpu.device_type = vk::PhysicalDeviceType::CPU;
    let candidates = [cpu, suitable("integrated"), suitable("discrete")];

    let first = select_device(described(&candidates)).unwrap();
    let second = select_device(described(&candidates)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.0, 1);
}

#[test]
fn unsuitable_devices_are_skipped() {
    let mut no_geometry = suitable("no geometry");
    no_geometry.geometry_shader = false;
    let mut no_anisotropy = suitable("no anisotropy");
    no_anisotropy.sampler_anisotropy = false;

    let candidates = [no_geometry, no_anisotropy, suitable("good")];

    assert_eq!(select_device(described(&candidates)).unwrap().0, 2);
}

#[test]
fn no_devices_is_fatal() {
    assert!(select_device(described(&[])).is_err());
}

#[test]
fn no_suitable_device_is_fatal() {
    let mut virtual_gpu = suitable("virtual");
    virtual_gpu.device_type = vk::PhysicalDeviceType::VIRTUAL_GPU;

    assert!(select_device(described(&[virtual_gpu])).is_err());
}

#[test]
fn adapters_after_the_chosen_one_are_not_described() {
    let mut described_count = 0;
    let candidates = [Ok(suitable("first")), Err(anyhow!("device lost"))]
        .into_iter()
        .inspect(|_| described_count += 1);

    assert_eq!(select_device(candidates).unwrap().0, 0);
    assert_eq!(described_count, 1);
}

#[test]
fn adapter_query_failure_skips_that_adapter() {
    let candidates = vec![Err(anyhow!("device lost")), Ok(suitable("second"))];

    assert_eq!(select_device(candidates).unwrap().0, 1);
}

#[test]
fn each_requirement_is_reported() {
    let mut candidate = suitable("gpu");
    candidate.queue_families.present = None;
    assert_eq!(
        candidate.check(),
        Err(SuitabilityError("required queue families"))
    );

    let mut candidate = suitable("gpu");
    candidate.extensions.clear();
    assert_eq!(
        candidate.check(),
        Err(SuitabilityError("required device extensions"))
    );

    let mut candidate = suitable("gpu");
    candidate.swapchain_adequate = false;
    assert_eq!(
        candidate.check(),
        Err(SuitabilityError("sufficient swapchain support"))
    );

    let mut candidate = suitable("gpu");
    candidate.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
    assert!(candidate.check().is_ok());
}

// ============================================================================
// Sample count
// ============================================================================

#[test]
fn supported_request_is_kept() {
    let supported = vk::SampleCountFlags::_1 | vk::SampleCountFlags::_2 | vk::SampleCountFlags::_4;
    assert_eq!(resolve_sample_count(4, supported), vk::SampleCountFlags::_4);
    assert_eq!(resolve_sample_count(1, supported), vk::SampleCountFlags::_1);
}

#[test]
fn unsupported_request_falls_back_to_highest_lower_count() {
    let supported = vk::SampleCountFlags::_1 | vk::SampleCountFlags::_2 | vk::SampleCountFlags::_4;
    assert_eq!(resolve_sample_count(8, supported), vk::SampleCountFlags::_4);
    assert_eq!(resolve_sample_count(64, vk::SampleCountFlags::_1), vk::SampleCountFlags::_1);
}
