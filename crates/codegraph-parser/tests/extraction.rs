use codegraph_core::{EntityType, Language, RelationshipType};
use codegraph_parser::{PackageRegistry, ParseResult, TreeSitterParser};

fn parse(source: &str, path: &str, language: Language, packages: &PackageRegistry) -> ParseResult {
    TreeSitterParser::new().parse_source(source, path, language, "demo", packages)
}

fn has_edge(result: &ParseResult, rel: RelationshipType, source: &str, target: &str) -> bool {
    result
        .relationships
        .iter()
        .any(|r| r.rel_type == rel && r.source == source && r.target == target)
}

const ORDER_SERVICE: &str = r#"package com.acme.service;

import com.acme.model.Order;
import com.acme.repo.OrderRepository;

/**
 * Places orders.
 */
@Service
public class OrderService extends BaseService implements Auditable {
    private final OrderRepository repository;

    public OrderService(OrderRepository repository) {
        this.repository = repository;
    }

    @Transactional
    public Order place(Order order) {
        validate(order);
        repository.save(order);
        return order;
    }

    private void validate(Order order) {
    }
}
"#;

#[test]
fn java_service_produces_the_expected_graph() {
    let packages = PackageRegistry::new();
    let result = parse(
        ORDER_SERVICE,
        "src/main/java/com/acme/service/OrderService.java",
        Language::Java,
        &packages,
    );
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let class = result
        .entities
        .iter()
        .find(|e| e.id == "com.acme.service.OrderService")
        .expect("class entity");
    assert_eq!(class.entity_type, EntityType::Class);
    assert_eq!(class.description.as_deref(), Some("Places orders."));
    assert!(class.annotations.iter().any(|a| a.name == "Service"));

    assert!(result
        .entities
        .iter()
        .any(|e| e.id == "com.acme.service" && e.entity_type == EntityType::Package));
    assert!(result
        .entities
        .iter()
        .any(|e| e.id == "com.acme.service/OrderService" && e.entity_type == EntityType::Module));

    let svc = "com.acme.service.OrderService";
    assert!(has_edge(&result, RelationshipType::BelongsTo, svc, "com.acme.service"));
    assert!(has_edge(&result, RelationshipType::Extends, svc, "com.acme.service.BaseService"));
    assert!(has_edge(&result, RelationshipType::Implements, svc, "com.acme.service.Auditable"));
    for member in ["place", "<init>", "repository"] {
        let member_id = format!("{}.{}", svc, member);
        assert!(has_edge(&result, RelationshipType::Contains, svc, &member_id));
    }
    assert!(has_edge(
        &result,
        RelationshipType::Calls,
        "com.acme.service.OrderService.place",
        "com.acme.service.OrderService.validate"
    ));
    assert!(has_edge(
        &result,
        RelationshipType::Calls,
        "com.acme.service.OrderService.place",
        "com.acme.repo.OrderRepository.save"
    ));
    assert!(has_edge(
        &result,
        RelationshipType::References,
        "com.acme.service.OrderService.place",
        "com.acme.model.Order"
    ));
    assert!(has_edge(
        &result,
        RelationshipType::Imports,
        "com.acme.service/OrderService",
        "com.acme.repo.OrderRepository"
    ));
}

#[test]
fn reparsing_is_deterministic() {
    let first = parse(ORDER_SERVICE, "OrderService.java", Language::Java, &PackageRegistry::new());
    let second = parse(ORDER_SERVICE, "OrderService.java", Language::Java, &PackageRegistry::new());
    assert_eq!(first, second);
}

#[test]
fn python_service_resolves_field_receivers_through_imports() {
    let source = r#"from repo import UserRepository


class UserService:
    """Looks users up."""

    def __init__(self, repo: UserRepository):
        self.repo = repo

    def find(self, user_id: int):
        return self.repo.get(user_id)


def build():
    return UserService(UserRepository())
"#;
    let packages = PackageRegistry::new();
    let result = parse(source, "app/service.py", Language::Python, &packages);
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    assert!(has_edge(&result, RelationshipType::BelongsTo, "service.UserService", "service"));
    let contains = RelationshipType::Contains;
    let user_service = "service.UserService";
    assert!(has_edge(&result, contains, user_service, "service.UserService.find"));
    assert!(has_edge(&result, contains, user_service, "service.UserService.repo"));
    assert!(has_edge(&result, RelationshipType::BelongsTo, "service.build", "service"));
    assert!(has_edge(
        &result,
        RelationshipType::Calls,
        "service.UserService.find",
        "repo.UserRepository.get"
    ));
    assert!(has_edge(
        &result,
        RelationshipType::Calls,
        "service.build",
        "service.UserService.__init__"
    ));
    assert!(has_edge(&result, RelationshipType::Imports, "service", "repo"));
}

#[test]
fn typescript_members_belong_to_their_class() {
    let source = r#"export class Cart {
  private items: string[] = [];

  add(item: string): void {
    this.items.push(item);
    this.touch();
  }

  touch(): void {}
}

export function total(cart: Cart): number {
  return 0;
}
"#;
    let packages = PackageRegistry::new();
    let result = parse(source, "web/cart.ts", Language::TypeScript, &packages);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(has_edge(&result, RelationshipType::BelongsTo, "cart.Cart", "cart"));
    assert!(has_edge(&result, RelationshipType::Contains, "cart.Cart", "cart.Cart.add"));
    assert!(has_edge(&result, RelationshipType::Contains, "cart.Cart", "cart.Cart.items"));
    assert!(has_edge(&result, RelationshipType::Calls, "cart.Cart.add", "cart.Cart.touch"));
    assert!(has_edge(&result, RelationshipType::BelongsTo, "cart.total", "cart"));
    assert!(has_edge(&result, RelationshipType::References, "cart.total", "cart.Cart"));
}

#[test]
fn packages_are_shared_across_files_of_a_scan() {
    let packages = PackageRegistry::new();
    let a = parse("package app;\nclass A {}\n", "app/A.java", Language::Java, &packages);
    let b = parse("package app;\nclass B {}\n", "app/B.java", Language::Java, &packages);
    let count = |r: &ParseResult| {
        r.entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Package)
            .count()
    };
    assert_eq!(count(&a) + count(&b), 1);
}
